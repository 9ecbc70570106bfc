use std::time::Duration;

use thiserror::Error;

/// Errors that can be returned by backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An HTTP request failed (network error, body read error, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Nothing is listening at the configured backend address.
    #[error("model backend not running at {0}")]
    ServerNotRunning(String),

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend reported an error inside an otherwise valid response.
    #[error("backend error: {0}")]
    Api(String),

    /// Failed to deserialize a backend payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A filesystem or process I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The profile-creation command ran but did not succeed.
    #[error("profile creation failed: {stderr}")]
    CreateFailed { code: Option<i32>, stderr: String },

    /// A backend call did not finish within its time budget.
    #[error("{operation} timed out after {}s", after.as_secs_f32())]
    Timeout { operation: &'static str, after: Duration },

    /// The backend closed a stream without signalling completion.
    #[error("stream closed before the backend finished the reply")]
    Incomplete,

    /// The readiness probe gave up.
    #[error("backend not ready after {attempts} attempts: {last_error}")]
    NotReady { attempts: u32, last_error: String },
}

impl BackendError {
    pub(crate) fn timeout(operation: &'static str, after: Duration) -> Self {
        BackendError::Timeout { operation, after }
    }
}
