//! HTTP route handlers and server wiring.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::{DestinationCatalog, StaticCatalog};
use crate::config::Config;
use crate::pipeline::CostPipeline;
use crate::providers::{
    CostEstimator, FlightFareProvider, HttpFlightProvider, LlmCostEstimator, UnavailableEstimator,
    UnavailableFlightProvider,
};
use crate::safety::SafetyScorer;
use crate::search::{
    parse_pagination, RecommendationService, RecsResponse, SearchParams, SearchQuery,
};
use crate::session::SessionManager;
use crate::store::{BatchMetadata, PricingStore, SqliteStore};

use super::types::{api_error, ApiError, HealthResponse, SessionResponse};

/// Shared application state.
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub recs: RecommendationService,
    pub store: Arc<dyn PricingStore>,
}

impl AppState {
    /// Wire the store, providers and engines from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn PricingStore> = Arc::new(SqliteStore::open(&config.database_path)?);

        let catalog: Arc<dyn DestinationCatalog> = match &config.catalog_path {
            Some(path) => Arc::new(StaticCatalog::from_json_file(path)?),
            None => Arc::new(StaticCatalog::builtin()),
        };

        let flights: Arc<dyn FlightFareProvider> = match &config.flight_api_url {
            Some(url) => Arc::new(HttpFlightProvider::new(
                url.clone(),
                config.flight_api_key.clone(),
            )),
            None => {
                tracing::info!("FLIGHT_API_URL not set; flight fares will be estimated");
                Arc::new(UnavailableFlightProvider)
            }
        };

        let estimator: Arc<dyn CostEstimator> = match config.estimation.api_key.as_deref() {
            Some(key) => Arc::new(LlmCostEstimator::from_settings(&config.estimation, key)),
            None => {
                tracing::warn!(
                    "OPENROUTER_API_KEY not set; cache misses will use fallback pricing"
                );
                Arc::new(UnavailableEstimator)
            }
        };

        let pipeline = Arc::new(CostPipeline::new(
            Arc::clone(&store),
            flights,
            estimator,
            Arc::new(SafetyScorer::builtin()),
            config.provider_timeout,
        ));

        Ok(Self {
            sessions: Arc::new(SessionManager::new(
                Arc::clone(&catalog),
                Arc::clone(&pipeline),
                config.session.clone(),
            )),
            recs: RecommendationService::new(catalog, pipeline, config.session.concurrency),
            store,
        })
    }
}

/// Build the router over an existing state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/travel/search/progressive", get(create_session))
        .route("/api/travel/search/progressive/:session_id", get(poll_session))
        .route("/api/travel/recs", get(recommendations))
        .route("/api/batches/:batch_id", get(get_batch))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and the session sweeper; returns on Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let shutdown = CancellationToken::new();
    let sweeper = state.sessions.spawn_sweeper(shutdown.clone());

    let app = router(Arc::clone(&state));
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    state.sessions.shutdown().await;
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Session sweeper ended abnormally");
    }
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = state.sessions.create(&query).await?;
    Ok(Json(snapshot.into()))
}

async fn poll_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = state.sessions.poll(&session_id, &query).await?;
    Ok(Json(snapshot.into()))
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<RecsResponse>, ApiError> {
    let params = SearchParams::from_query(&query)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let (page, limit) =
        parse_pagination(&query).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let response = state.recs.recommend(&params, page, limit).await.map_err(|e| {
        tracing::error!(error = %e, "Recommendation query failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(response))
}

async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchMetadata>, ApiError> {
    match state.store.get_batch(&batch_id).await {
        Ok(Some(meta)) => Ok(Json(meta)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown batch: {batch_id}"),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixed_clock, sample_destinations, FakeEstimator, FakeFlights};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    fn test_state() -> Arc<AppState> {
        let store: Arc<dyn PricingStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let catalog: Arc<dyn DestinationCatalog> =
            Arc::new(StaticCatalog::new(sample_destinations()));
        let pipeline = Arc::new(
            CostPipeline::new(
                Arc::clone(&store),
                Arc::new(FakeFlights::fare(450.0)),
                Arc::new(FakeEstimator::healthy()),
                Arc::new(SafetyScorer::builtin()),
                Duration::from_secs(1),
            )
            .with_clock(fixed_clock()),
        );
        Arc::new(AppState {
            sessions: Arc::new(SessionManager::new(
                Arc::clone(&catalog),
                Arc::clone(&pipeline),
                crate::config::SessionSettings::default(),
            )),
            recs: RecommendationService::new(catalog, pipeline, 4),
            store,
        })
    }

    async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(&test_state(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_progressive_create_and_poll() {
        let state = test_state();
        let (status, created) = get_json(
            &state,
            "/api/travel/search/progressive?budget=2000&nights=5&origin=phx",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["success"], true);
        let session_id = created["sessionId"].as_str().unwrap().to_string();
        assert!(!session_id.is_empty());
        assert!(created["progress"]["total"].as_u64().unwrap() > 0);

        let (status, polled) = get_json(
            &state,
            &format!("/api/travel/search/progressive/{session_id}?region=asia"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(polled["sessionId"], json!(session_id));
        for result in polled["results"].as_array().unwrap() {
            assert_eq!(result["region"], "asia");
        }
    }

    #[tokio::test]
    async fn test_invalid_search_is_a_client_error() {
        let (status, body) =
            get_json(&test_state(), "/api/travel/search/progressive?nights=5&origin=PHX").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("budget"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (status, body) =
            get_json(&test_state(), "/api/travel/search/progressive/does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_recs_shape() {
        let (status, body) = get_json(
            &test_state(),
            "/api/travel/recs?budget=5000&nights=4&origin=JFK&limit=3&page=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 3);
        assert_eq!(body["pagination"]["limit"], 3);
        assert_eq!(body["pagination"]["total"], sample_destinations().len());
        assert_eq!(body["query"]["origin"], "JFK");
        assert!(body["meta"]["disclaimer"].is_string());
        assert!(body["countries"].is_array());

        let first = &body["results"][0];
        assert!(first["totals"]["p35"].is_number());
        assert!(first["lastUpdatedISO"].is_string());
        assert_eq!(first["breakdown"]["flight"]["source"], "live");
    }

    #[tokio::test]
    async fn test_recs_rejects_bad_limit() {
        let (status, _) = get_json(
            &test_state(),
            "/api/travel/recs?budget=5000&nights=4&origin=JFK&limit=500",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_lookup() {
        let state = test_state();
        let meta = BatchMetadata::start("batch_1_abcdefghi", 3, json!({ "groupSize": 5 }));
        state.store.create_batch(&meta).await.unwrap();

        let (status, body) = get_json(&state, "/api/batches/batch_1_abcdefghi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["totalCities"], 3);

        let (status, _) = get_json(&state, "/api/batches/batch_missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
