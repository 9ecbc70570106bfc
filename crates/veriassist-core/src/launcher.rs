//! Background launch of the model-serving process.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Starts `ollama serve` without waiting for it.
#[derive(Debug, Clone)]
pub struct BackendLauncher {
    program: PathBuf,
    host: String,
    origins: String,
}

impl BackendLauncher {
    /// `host` is the bind address handed to the server (`OLLAMA_HOST`),
    /// `origins` its CORS allow-list (`OLLAMA_ORIGINS`).
    pub fn new(program: impl Into<PathBuf>, host: impl Into<String>, origins: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            host: host.into(),
            origins: origins.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("serve")
            .env("OLLAMA_HOST", &self.host)
            .env("OLLAMA_ORIGINS", &self.origins)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    /// Spawn the server and return immediately.
    ///
    /// Spawn failures are logged, not returned.  Calling this while a backend
    /// is already listening is harmless: the second server fails to bind and
    /// exits on its own.  Must be called from within a Tokio runtime.
    pub fn start(&self) {
        match self.command().spawn() {
            Ok(mut child) => {
                info!(
                    program = %self.program.display(),
                    host = %self.host,
                    pid = ?child.id(),
                    "starting model backend"
                );
                // Reap the child so it never lingers as a zombie.
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => debug!(%status, "model backend process exited"),
                        Err(e) => warn!(error = %e, "failed to wait on model backend process"),
                    }
                });
            }
            Err(e) => {
                warn!(
                    program = %self.program.display(),
                    error = %e,
                    "failed to launch model backend; assuming one is already running"
                );
            }
        }
    }
}
