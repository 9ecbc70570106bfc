//! veriassist-core – chat session management over a local Ollama backend.
//!
//! The crate is split along the lifecycle of the model backend:
//!
//! - [`launcher`] starts the serving process in the background.
//! - [`probe`] waits until the backend answers.
//! - [`provision`] makes sure the chat profile (base model + system prompt)
//!   exists exactly once.
//! - [`warmup`] forces the model into memory with one throwaway request.
//! - [`chat`] owns conversation history and streams replies fragment by
//!   fragment.
//!
//! Every backend interaction goes through the [`backend::ChatBackend`] trait;
//! [`backend::ollama::OllamaBackend`] is the production implementation.

pub mod backend;
pub mod chat;
pub mod launcher;
pub mod probe;
pub mod provision;
pub mod warmup;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::error::BackendError;
pub use backend::{
    ChatBackend, ChatMessage, ChatRequest, FragmentStream, KeepAlive, ProfileInfo, Role,
};
pub use chat::{ChatSession, History, SessionHandle};
pub use provision::{ProfileSpec, ProvisionOutcome, Provisioner};
