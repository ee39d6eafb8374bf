//! Offline cache warming job.
//!
//! Walks the destination catalog once, storing hotel and daily-cost rows for
//! every city under a fresh batch id. Takes no arguments; configuration comes
//! from the environment. Exits non-zero when the batch cannot run or fails.

use std::process::ExitCode;
use std::sync::Arc;

use budget_compass::batch::BatchPopulator;
use budget_compass::catalog::{DestinationCatalog, StaticCatalog};
use budget_compass::providers::LlmCostEstimator;
use budget_compass::store::SqliteStore;
use budget_compass::{init_tracing, Config};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Cache population failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let api_key = config.require_estimation_key()?;

    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    let catalog: Box<dyn DestinationCatalog> = match &config.catalog_path {
        Some(path) => Box::new(StaticCatalog::from_json_file(path)?),
        None => Box::new(StaticCatalog::builtin()),
    };
    let estimator = Arc::new(LlmCostEstimator::from_settings(&config.estimation, api_key));

    let populator = BatchPopulator::new(
        store,
        estimator,
        config.batch.clone(),
        &config.estimation.model,
        config.provider_timeout,
    );

    let report = populator.run(catalog.as_ref()).await?;
    tracing::info!(
        batch_id = %report.batch_id,
        processed = report.processed_cities,
        total = report.total_cities,
        successful_calls = report.successful_calls,
        failed_calls = report.failed_calls,
        total_cost_usd = report.total_cost,
        duration_secs = report.duration.as_secs_f64(),
        "Cache population finished"
    );
    Ok(())
}
