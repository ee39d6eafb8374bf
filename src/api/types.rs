//! API request and response types.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::session::{SessionError, SessionSnapshot};

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub status: String,
    pub error: String,
}

/// Error half of every handler's result.
pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            success: false,
            status: "error".to_string(),
            error: message.into(),
        }),
    )
}

impl From<SessionError> for (StatusCode, Json<ErrorBody>) {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, err.to_string())
    }
}

/// Progressive search create/poll response.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

impl From<SessionSnapshot> for SessionResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            success: true,
            snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
