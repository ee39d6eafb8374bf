//! Provider adapters - thin interfaces to the external pricing sources.
//!
//! # Providers
//! - **FlightFareProvider**: live fares; may be degraded or unavailable
//! - **CostEstimator**: AI estimates of hotel percentiles and daily spend
//!
//! Adapters never rate-limit or retry on their own. Callers throttle them and
//! substitute fallbacks on failure; [`with_timeout`] bounds a single call.

mod estimator;
mod flights;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::pricing::{DailyCosts, HotelPercentiles};

pub use estimator::{LlmCostEstimator, TokenPricing};
pub use flights::{synthetic_flight_estimate, HttpFlightProvider, UnavailableFlightProvider};

/// Errors that can occur within a provider adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure talking to the provider.
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with an error status.
    #[error("Provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider answered but the payload was unusable.
    #[error("Unusable provider response: {0}")]
    Parse(String),

    /// The provider is not configured or currently disabled.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its time limit.
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Failure reported by the underlying LLM client.
    #[error("Estimation model failed: {0}")]
    Llm(#[from] anyhow::Error),
}

/// A fare for one origin/destination pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightFare {
    /// Round-trip price in USD
    pub price: f64,
    /// True when the provider itself flags the fare as indicative
    pub is_estimate: bool,
}

/// A provider answer together with what the call cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Priced<T> {
    pub value: T,
    pub cost_usd: f64,
}

/// Live flight fares.
#[async_trait]
pub trait FlightFareProvider: Send + Sync {
    async fn fetch_flight_fare(
        &self,
        origin: &str,
        destination_city_id: &str,
        month: Option<u32>,
    ) -> Result<FlightFare, ProviderError>;
}

/// AI estimation of hotel and daily costs. Each call is independently fallible.
#[async_trait]
pub trait CostEstimator: Send + Sync {
    async fn fetch_hotel_pricing(
        &self,
        city_name: &str,
        country_name: &str,
    ) -> Result<Priced<HotelPercentiles>, ProviderError>;

    async fn fetch_daily_costs(
        &self,
        city_name: &str,
        country_name: &str,
    ) -> Result<Priced<DailyCosts>, ProviderError>;
}

/// Estimator used when no estimation model is configured.
pub struct UnavailableEstimator;

#[async_trait]
impl CostEstimator for UnavailableEstimator {
    async fn fetch_hotel_pricing(
        &self,
        _city_name: &str,
        _country_name: &str,
    ) -> Result<Priced<HotelPercentiles>, ProviderError> {
        Err(ProviderError::Unavailable("no estimation model configured".to_string()))
    }

    async fn fetch_daily_costs(
        &self,
        _city_name: &str,
        _country_name: &str,
    ) -> Result<Priced<DailyCosts>, ProviderError> {
        Err(ProviderError::Unavailable("no estimation model configured".to_string()))
    }
}

/// Run a provider call with a time limit; expiry becomes [`ProviderError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ProviderError>(1)
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through_results() {
        let fast = async { Ok::<_, ProviderError>(7) };
        assert_eq!(with_timeout(Duration::from_secs(1), fast).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_unavailable_estimator_fails_both_calls() {
        let estimator = UnavailableEstimator;
        assert!(estimator.fetch_hotel_pricing("Lima", "Peru").await.is_err());
        assert!(estimator.fetch_daily_costs("Lima", "Peru").await.is_err());
    }
}
