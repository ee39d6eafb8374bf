//! Budget Compass HTTP server.

use budget_compass::{api, init_tracing, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database_path.display(),
        live_estimates = config.estimation.api_key.is_some(),
        live_fares = config.flight_api_url.is_some(),
        "Starting Budget Compass"
    );

    api::serve(config).await
}
