//! Chat API request / response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Form body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChatForm {
    /// The user's message.  Missing means empty.
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of `POST /api/reset`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetResponse {
    /// Always `true`; resetting cannot fail.
    pub reset: bool,
}

/// Body of every error response sent before streaming starts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable reason, e.g. `"Invalid request method"`.
    pub error: String,
}
