//! Scripted in-memory [`ChatBackend`] for tests.
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for downstream crates.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use crate::backend::error::BackendError;
use crate::backend::{ChatBackend, ChatRequest, FragmentStream, ProfileInfo};

/// What the next `stream_chat` call should do.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Yield these fragments, then finish normally.
    Fragments(Vec<String>),
    /// Yield these fragments, then fail.
    FailAfter { fragments: Vec<String>, error: String },
    /// Fail before any fragment is produced.
    FailToOpen(String),
    /// Yield these fragments, then never finish.
    Hang(Vec<String>),
}

impl Reply {
    pub fn fragments(parts: &[&str]) -> Self {
        Reply::Fragments(parts.iter().map(|s| s.to_string()).collect())
    }

    pub fn fail_after(parts: &[&str], error: &str) -> Self {
        Reply::FailAfter {
            fragments: parts.iter().map(|s| s.to_string()).collect(),
            error: error.to_owned(),
        }
    }
}

/// Records every call and answers from a queue of [`Reply`] values.
///
/// When the queue is empty, chat calls answer with a single `"ok"` fragment.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    profiles: Mutex<Vec<String>>,
    definitions: Mutex<Vec<(String, String)>>,
    create_error: Mutex<Option<String>>,
    fail_listing: AtomicBool,
    ping_failures: AtomicUsize,
    pings: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: Reply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Pretend `name` already exists on the backend.
    pub fn with_profile(self, name: &str) -> Self {
        self.profiles.lock().unwrap().push(name.to_owned());
        self
    }

    pub fn failing_listing(self) -> Self {
        self.fail_listing.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_creation(self, stderr: &str) -> Self {
        *self.create_error.lock().unwrap() = Some(stderr.to_owned());
        self
    }

    /// Fail the first `n` pings (`usize::MAX` fails forever).
    pub fn failing_pings(self, n: usize) -> Self {
        self.ping_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Every chat request received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// `(profile name, definition file contents)` per creation call.
    pub fn definitions(&self) -> Vec<(String, String)> {
        self.definitions.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let attempt = self.pings.fetch_add(1, Ordering::SeqCst);
        if attempt < self.ping_failures.load(Ordering::SeqCst) {
            return Err(BackendError::ServerNotRunning("scripted".into()));
        }
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileInfo>, BackendError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BackendError::Api("listing unavailable".into()));
        }
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .map(|name| ProfileInfo { name: name.clone() })
            .collect())
    }

    async fn create_profile(&self, name: &str, definition: &Path) -> Result<(), BackendError> {
        let contents = tokio::fs::read_to_string(definition).await?;
        self.definitions
            .lock()
            .unwrap()
            .push((name.to_owned(), contents));

        if let Some(stderr) = self.create_error.lock().unwrap().clone() {
            return Err(BackendError::CreateFailed { code: Some(1), stderr });
        }
        self.profiles.lock().unwrap().push(format!("{name}:latest"));
        Ok(())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, BackendError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::fragments(&["ok"]));

        let stream = match reply {
            Reply::Fragments(parts) => stream::iter(parts.into_iter().map(Ok)).boxed(),
            Reply::FailAfter { fragments, error } => stream::iter(fragments.into_iter().map(Ok))
                .chain(stream::once(async move { Err(BackendError::Api(error)) }))
                .boxed(),
            Reply::FailToOpen(error) => return Err(BackendError::Api(error)),
            Reply::Hang(parts) => stream::iter(parts.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
        };
        Ok(stream)
    }
}
