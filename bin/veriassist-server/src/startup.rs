//! Backend startup sequence and the readiness flag chat requests wait on.
//!
//! The sequence runs once, in a background task, so the HTTP listener is up
//! while the model backend is still starting:
//!
//! 1. launch `ollama serve` (optional),
//! 2. poll until the backend answers (past the deadline the state turns
//!    `Failed`, but polling goes on so a late backend is still picked up),
//! 3. make sure the chat profile exists,
//! 4. mark the backend ready,
//! 5. warm the model up with one throwaway request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use veriassist_core::launcher::BackendLauncher;
use veriassist_core::probe::wait_until_ready;
use veriassist_core::warmup::warm_up;
use veriassist_core::{ChatBackend, ProfileSpec, ProvisionOutcome, Provisioner};

use crate::error::ServerError;

/// Where the startup sequence currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BackendState {
    Uninitialized,
    Initializing,
    Ready,
    /// The backend missed its startup deadline; chat requests are refused
    /// until it answers.
    Failed(String),
}

/// Shared view of [`BackendState`].
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<BackendState>>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BackendState::Uninitialized);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> BackendState {
        self.tx.borrow().clone()
    }

    pub fn set(&self, state: BackendState) {
        self.tx.send_replace(state);
    }

    /// Wait up to `limit` for startup to settle.
    pub async fn wait(&self, limit: Duration) -> Result<(), ServerError> {
        let mut rx = self.tx.subscribe();
        let settled = tokio::time::timeout(
            limit,
            rx.wait_for(|s| matches!(s, BackendState::Ready | BackendState::Failed(_))),
        )
        .await;

        match settled {
            Ok(Ok(state)) => match &*state {
                BackendState::Failed(reason) => Err(ServerError::BackendNotReady(format!(
                    "model backend failed to start: {reason}"
                ))),
                _ => Ok(()),
            },
            // The sender lives in `self`, so the channel cannot close here.
            Ok(Err(_)) => Err(ServerError::BackendNotReady("model backend state unavailable".into())),
            Err(_) => Err(ServerError::BackendNotReady(format!(
                "model backend still starting after {}s",
                limit.as_secs_f32()
            ))),
        }
    }
}

/// Everything the startup sequence needs.
pub struct Startup {
    /// `None` when an already running backend is expected.
    pub launcher: Option<BackendLauncher>,
    pub backend: Arc<dyn ChatBackend>,
    pub profile: ProfileSpec,
    pub artifact_dir: PathBuf,
    pub probe_timeout: Duration,
}

impl Startup {
    /// Run the sequence in a background task.
    pub fn spawn(self, readiness: Readiness) -> JoinHandle<()> {
        readiness.set(BackendState::Initializing);
        tokio::spawn(self.run(readiness))
    }

    pub async fn run(self, readiness: Readiness) {
        if let Some(launcher) = &self.launcher {
            launcher.start();
        }

        if let Err(e) = wait_until_ready(self.backend.as_ref(), self.probe_timeout).await {
            warn!(error = %e, "model backend did not come up");
            readiness.set(BackendState::Failed(e.to_string()));

            if let Err(e) = wait_until_ready(self.backend.as_ref(), Duration::MAX).await {
                warn!(error = %e, "gave up waiting for the model backend");
                return;
            }
            info!("model backend came up late");
        }

        let provisioner = Provisioner::new(Arc::clone(&self.backend), &self.artifact_dir);
        match provisioner.ensure(&self.profile).await {
            ProvisionOutcome::Failed(reason) => {
                warn!(profile = %self.profile.name, %reason, "continuing without a provisioned profile")
            }
            outcome => info!(profile = %self.profile.name, ?outcome, "profile ready"),
        }

        readiness.set(BackendState::Ready);
        info!("model backend ready");

        match warm_up(self.backend.as_ref(), &self.profile.name).await {
            Ok(chars) => info!(profile = %self.profile.name, reply_len = chars, "model warmed up"),
            Err(e) => warn!(profile = %self.profile.name, error = %e, "warm-up request failed"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
