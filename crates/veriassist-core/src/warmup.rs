//! Throwaway request that loads the model into memory before real traffic.

use futures::StreamExt;

use crate::backend::error::BackendError;
use crate::backend::{ChatBackend, ChatMessage, ChatRequest, KeepAlive};

pub const WARMUP_PROMPT: &str = "Hi, what is verification?";

/// Send [`WARMUP_PROMPT`] to `profile`, drain the reply and discard it.
///
/// Returns the number of bytes the backend produced.
pub async fn warm_up(backend: &dyn ChatBackend, profile: &str) -> Result<usize, BackendError> {
    let request = ChatRequest {
        profile: profile.to_owned(),
        messages: vec![ChatMessage::user(WARMUP_PROMPT)],
        keep_alive: KeepAlive::Default,
    };

    let mut stream = backend.stream_chat(request).await?;
    let mut produced = 0;
    while let Some(fragment) = stream.next().await {
        produced += fragment?.len();
    }
    Ok(produced)
}
