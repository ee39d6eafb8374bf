//! HTTP API for Budget Compass.
//!
//! ## Endpoints
//!
//! - `GET /api/travel/search/progressive` - Start a progressive search session
//! - `GET /api/travel/search/progressive/{sessionId}` - Poll a session
//! - `GET /api/travel/recs` - Synchronous, paginated recommendations
//! - `GET /api/batches/{batchId}` - Cache warming batch status
//! - `GET /api/health` - Health check

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
