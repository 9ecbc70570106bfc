use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{ChatBackend, ChatRequest, FragmentStream, KeepAlive};

use super::History;

/// One conversation against a chat profile.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    profile: String,
    base_model: String,
    history: History,
    lowercase_input: bool,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("profile", &self.profile)
            .field("base_model", &self.base_model)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        profile: impl Into<String>,
        base_model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            profile: profile.into(),
            base_model: base_model.into(),
            history: History::new(),
            lowercase_input: true,
        }
    }

    /// Whether user messages are lower-cased before they are stored and sent.
    /// On by default.
    pub fn with_lowercase_input(mut self, enabled: bool) -> Self {
        self.lowercase_input = enabled;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
        info!(profile = %self.profile, "conversation history reset");
    }

    fn normalize(&self, message: String) -> String {
        if self.lowercase_input {
            message.to_lowercase()
        } else {
            message
        }
    }

    fn request(&self) -> ChatRequest {
        ChatRequest {
            profile: self.profile.clone(),
            messages: self.history.messages().to_vec(),
            keep_alive: KeepAlive::Forever,
        }
    }
}

/// Shared, lock-guarded handle to a [`ChatSession`].
///
/// A turn holds the session lock from the first poll of its stream until the
/// stream finishes or is dropped, so turns of one session never interleave.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<ChatSession>>,
}

impl SessionHandle {
    pub fn new(session: ChatSession) -> Self {
        Self { inner: Arc::new(Mutex::new(session)) }
    }

    /// Run one turn and stream the reply.
    ///
    /// The user message is appended before the backend is called.  The
    /// assistant reply is appended only once the backend has finished; if the
    /// backend fails, the error is yielded after any fragments already
    /// delivered and history keeps just the user message.  Dropping the
    /// stream early closes the backend call and appends nothing.
    pub fn generate(&self, message: impl Into<String>) -> FragmentStream {
        let inner = Arc::clone(&self.inner);
        let message = message.into();

        Box::pin(stream! {
            let mut session = inner.lock_owned().await;
            let message = session.normalize(message);
            debug!(profile = %session.profile, message = %message, "user turn");
            session.history.push_user(message);

            let backend = Arc::clone(&session.backend);
            let mut upstream = match backend.stream_chat(session.request()).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    warn!(error = %e, "failed to open chat stream");
                    yield Err(e);
                    return;
                }
            };

            let mut reply = String::new();
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(fragment) => {
                        reply.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        warn!(error = %e, delivered = reply.len(), "chat stream failed");
                        yield Err(e);
                        return;
                    }
                }
            }

            debug!(reply_len = reply.len(), "assistant turn complete");
            session.history.push_assistant(reply);
        })
    }

    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }

    /// Snapshot of the current history.
    ///
    /// Waits for any turn in progress to finish.
    pub async fn history(&self) -> History {
        self.inner.lock().await.history().clone()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
