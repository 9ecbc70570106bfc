//! Contract with the model backend.
//!
//! [`ChatBackend`] is the seam between session logic and the concrete
//! inference server.  Swap [`ollama::OllamaBackend`] for another
//! implementation (or a scripted fake in tests) without touching the session
//! or provisioning code.

pub mod error;
mod ndjson;
pub mod ollama;

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use self::error::BackendError;

/// Author of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// How long the backend keeps the model loaded after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepAlive {
    /// Whatever the backend is configured to do.
    #[default]
    Default,
    /// Never unload the model.
    Forever,
}

/// A streaming chat call: the whole conversation, addressed to one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Name of the chat profile (model + system prompt) to run.
    pub profile: String,
    /// Full ordered conversation, newest message last.
    pub messages: Vec<ChatMessage>,
    pub keep_alive: KeepAlive,
}

/// An entry of the backend's existing-profile list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
}

/// Fragments of generated text, in emission order.
///
/// The stream is single-pass.  It ends after the backend signals completion,
/// or right after yielding the first `Err`.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Operations this system needs from the model backend.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Lightweight liveness check.
    async fn ping(&self) -> Result<(), BackendError>;

    /// List the profiles the backend already knows about.
    async fn list_profiles(&self) -> Result<Vec<ProfileInfo>, BackendError>;

    /// Create profile `name` from the definition file at `definition`.
    async fn create_profile(&self, name: &str, definition: &Path) -> Result<(), BackendError>;

    /// Open a streaming chat call.
    ///
    /// Dropping the returned stream closes the underlying connection.
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, BackendError>;
}
