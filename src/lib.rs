//! # Budget Compass
//!
//! Travel cost estimation under a budget. For each candidate destination the
//! engine blends live flight fares, cached or AI-estimated hotel and daily
//! costs, and a recency-weighted safety score into a `CityRecommendation`.
//!
//! ## Architecture
//!
//! - **store**: SQLite pricing cache and batch bookkeeping
//! - **providers**: flight fare and AI cost estimation adapters
//! - **safety**: pure safety scoring over injected reference data
//! - **pipeline**: per-destination aggregation with fallbacks
//! - **session**: progressive search sessions with polling
//! - **batch**: offline cache warming under rate limits
//! - **api**: HTTP endpoints
//!
//! ## Flow
//!
//! ```text
//! populate-cache -> BatchPopulator -> PricingStore
//! HTTP -> SessionManager -> CostPipeline -> (PricingStore | providers) + SafetyScorer
//! ```

pub mod api;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod pricing;
pub mod providers;
pub mod safety;
pub mod search;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::Config;

/// Install the `tracing` subscriber used by both binaries.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "budget_compass=info,populate_cache=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
