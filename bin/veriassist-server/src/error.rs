//! Unified server error type.
//!
//! Handlers return `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Errors raised after a chat stream has started are not represented here:
//! headers are already sent by then, so they travel in-band (see
//! `routes::chat`).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use crate::schemas::chat::ErrorResponse;

/// All errors that can occur before a response starts streaming.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The model backend has not finished starting, or failed to.
    #[error("backend not ready: {0}")]
    BackendNotReady(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ServerError::BackendNotReady(m) => {
                warn!(reason = %m, "rejecting request: model backend not ready");
                (StatusCode::SERVICE_UNAVAILABLE, m)
            }
        };
        (status, Json(ErrorResponse { error: client_message })).into_response()
    }
}
