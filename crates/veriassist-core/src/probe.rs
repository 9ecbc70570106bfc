//! Readiness polling with exponential backoff.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::backend::ChatBackend;
use crate::backend::error::BackendError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Ping `backend` until it answers or `deadline` has passed.
pub async fn wait_until_ready(backend: &dyn ChatBackend, deadline: Duration) -> Result<(), BackendError> {
    let started = Instant::now();
    let mut delay = INITIAL_BACKOFF;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match backend.ping().await {
            Ok(()) => {
                info!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "model backend is ready"
                );
                return Ok(());
            }
            Err(e) => {
                if started.elapsed() + delay > deadline {
                    return Err(BackendError::NotReady {
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                debug!(attempts, error = %e, retry_in_ms = delay.as_millis() as u64, "model backend not ready yet");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
    }
}
