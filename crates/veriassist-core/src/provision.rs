//! One-time provisioning of the chat profile.
//!
//! [`Provisioner::ensure`] checks the backend's profile list and, when the
//! profile is missing, writes a temporary definition file, asks the backend
//! to build the profile from it, and removes the file again.  Nothing here is
//! fatal: every failure is logged and reported as
//! [`ProvisionOutcome::Failed`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::ChatBackend;

/// A named profile: base model plus a fixed system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSpec {
    pub name: String,
    pub base_model: String,
    /// Passed through verbatim; markdown, tables and emoji included.
    pub system_prompt: String,
}

impl ProfileSpec {
    pub fn new(
        name: impl Into<String>,
        base_model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_model: base_model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Contents of the definition file handed to the backend.
    pub fn definition(&self) -> String {
        format!("FROM {}\nSYSTEM \"{}\"\n", self.base_model, self.system_prompt)
    }

    /// Whether `listed` (an entry of the backend's list) names this profile.
    /// The backend reports untagged profiles with an implicit `:latest`.
    fn matches(&self, listed: &str) -> bool {
        listed == self.name
            || (!self.name.contains(':')
                && listed
                    .strip_prefix(self.name.as_str())
                    .is_some_and(|tag| tag == ":latest"))
    }
}

/// What [`Provisioner::ensure`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyPresent,
    Created,
    Failed(String),
}

/// Creates chat profiles on a backend, at most once each.
pub struct Provisioner {
    backend: Arc<dyn ChatBackend>,
    artifact_dir: PathBuf,
}

impl Provisioner {
    /// `artifact_dir` receives the short-lived definition files.
    pub fn new(backend: Arc<dyn ChatBackend>, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            artifact_dir: artifact_dir.into(),
        }
    }

    pub async fn ensure(&self, profile: &ProfileSpec) -> ProvisionOutcome {
        match self.backend.list_profiles().await {
            Ok(existing) if existing.iter().any(|p| profile.matches(&p.name)) => {
                info!(profile = %profile.name, "profile already exists; skipping creation");
                return ProvisionOutcome::AlreadyPresent;
            }
            Ok(existing) => {
                debug!(profile = %profile.name, known = existing.len(), "profile not found");
            }
            Err(e) => {
                warn!(profile = %profile.name, error = %e, "could not check existing profiles; creating anyway");
            }
        }

        let artifact = match DefinitionArtifact::write(&self.artifact_dir, profile).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(profile = %profile.name, error = %e, "failed to write profile definition");
                return ProvisionOutcome::Failed(e.to_string());
            }
        };

        let result = self.backend.create_profile(&profile.name, artifact.path()).await;
        artifact.remove().await;

        match result {
            Ok(()) => {
                info!(profile = %profile.name, base_model = %profile.base_model, "profile created");
                ProvisionOutcome::Created
            }
            Err(e) => {
                warn!(profile = %profile.name, error = %e, "error while creating profile");
                ProvisionOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Definition file on disk; removed by [`remove`](Self::remove) or, if the
/// provisioning future is dropped first, on drop.
struct DefinitionArtifact {
    path: PathBuf,
    removed: bool,
}

impl DefinitionArtifact {
    async fn write(dir: &Path, profile: &ProfileSpec) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let artifact = Self {
            path: dir.join(format!("Modelfile_{}", file_safe(&profile.name))),
            removed: false,
        };
        // Overwrites anything left behind by an earlier crash.
        tokio::fs::write(&artifact.path, profile.definition()).await?;
        debug!(path = %artifact.path.display(), "profile definition written");
        Ok(artifact)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "cleaned up profile definition"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to delete profile definition"),
        }
    }
}

impl Drop for DefinitionArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to delete profile definition");
            }
        }
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
