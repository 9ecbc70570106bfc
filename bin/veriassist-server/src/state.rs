//! Shared application state injected into every Axum handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;
use veriassist_core::{ChatBackend, ChatSession, SessionHandle};

use crate::config::Config;
use crate::startup::Readiness;

/// Everything needed to open a fresh [`ChatSession`].
pub struct SessionTemplate {
    pub backend: Arc<dyn ChatBackend>,
    pub profile: String,
    pub base_model: String,
    pub lowercase_input: bool,
}

impl SessionTemplate {
    fn build(&self) -> ChatSession {
        ChatSession::new(Arc::clone(&self.backend), &self.profile, &self.base_model)
            .with_lowercase_input(self.lowercase_input)
    }
}

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// Result of [`SessionRegistry::get_or_create`].
pub struct SessionLookup {
    pub token: String,
    pub handle: SessionHandle,
    /// The client does not hold this token yet.
    pub created: bool,
}

/// Chat sessions keyed by the client's session token.
pub struct SessionRegistry {
    template: SessionTemplate,
    entries: Mutex<HashMap<String, SessionEntry>>,
    max_sessions: usize,
    idle: Duration,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionRegistry({} sessions)", self.len())
    }
}

impl SessionRegistry {
    pub fn new(template: SessionTemplate, max_sessions: usize, idle: Duration) -> Self {
        Self {
            template,
            entries: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find the session for `token`, or open a new one.
    ///
    /// A well-formed but unknown token (e.g. from before a restart) is kept
    /// so the client's cookie stays valid; anything else gets a new token.
    pub fn get_or_create(&self, token: Option<&str>) -> SessionLookup {
        let mut entries = self.entries();

        if let Some(entry) = token.and_then(|t| entries.get_mut(t)) {
            entry.last_seen = Instant::now();
            return SessionLookup {
                token: token.unwrap_or_default().to_owned(),
                handle: entry.handle.clone(),
                created: false,
            };
        }

        let (token, created) = match token.filter(|t| Uuid::parse_str(t).is_ok()) {
            Some(t) => (t.to_owned(), false),
            None => (Uuid::new_v4().to_string(), true),
        };

        self.make_room(&mut entries);
        let handle = SessionHandle::new(self.template.build());
        entries.insert(
            token.clone(),
            SessionEntry {
                handle: handle.clone(),
                last_seen: Instant::now(),
            },
        );
        debug!(session = %token, sessions = entries.len(), "chat session opened");

        SessionLookup { token, handle, created }
    }

    pub fn get(&self, token: &str) -> Option<SessionHandle> {
        self.entries().get(token).map(|e| e.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Evict idle sessions, then the least recently used one, until there is
    /// room for one more.  A turn still streaming on an evicted session runs
    /// to completion; only the registry forgets it.
    fn make_room(&self, entries: &mut HashMap<String, SessionEntry>) {
        if entries.len() < self.max_sessions {
            return;
        }
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.last_seen) < self.idle);

        while entries.len() >= self.max_sessions {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(token, _)| token.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            debug!(session = %oldest, "evicted least recently used chat session");
        }
    }
}

/// State shared across all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// One chat session per client.
    pub sessions: SessionRegistry,
    /// Progress of the backend startup sequence.
    pub readiness: Readiness,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn ChatBackend>) -> Self {
        let sessions = SessionRegistry::new(
            SessionTemplate {
                backend,
                profile: config.profile_name.clone(),
                base_model: config.base_model.clone(),
                lowercase_input: config.lowercase_input,
            },
            config.max_sessions,
            config.session_idle,
        );
        Self {
            config: Arc::new(config),
            sessions,
            readiness: Readiness::new(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
