//! Gateway error taxonomy mapped to HTTP responses.
//!
//! Grounded on `api-server/src/routes/auth.rs`'s `map_auth_error`: one flat
//! enum, one match to a status code, the message surfaced verbatim in the
//! body. Adapter and pipeline errors reaching the gateway (e.g. while
//! enqueueing a sub-task) are folded in as `Internal`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("missing required scope: {0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream service unavailable")]
    UpstreamUnavailable,
    #[error("upstream service timed out")]
    UpstreamTimeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<cp_core::CoreError> for GatewayError {
    fn from(err: cp_core::CoreError) -> Self {
        match err {
            cp_core::CoreError::NotFound(msg) => Self::NotFound(msg),
            cp_core::CoreError::Conflict(msg) => Self::Conflict(msg),
            cp_core::CoreError::Validation(msg) => Self::Validation(msg),
            cp_core::CoreError::Storage(msg) => Self::Internal(msg),
            cp_core::CoreError::Serialization(err) => Self::Internal(err.to_string()),
            cp_core::CoreError::Io(err) => Self::Internal(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
