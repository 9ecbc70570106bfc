//! Ollama implementation of [`ChatBackend`].
//!
//! HTTP endpoints used:
//! - `GET  /api/version` – readiness probe
//! - `GET  /api/tags`    – existing profiles
//! - `POST /api/chat`    – streaming chat (NDJSON response)
//!
//! Profile creation goes through the `ollama create` CLI, since it takes a
//! definition file from local disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use super::error::BackendError;
use super::ndjson::{ChunkEvent, LineBuffer, decode_line};
use super::{ChatBackend, ChatMessage, ChatRequest, FragmentStream, KeepAlive, ProfileInfo};

/// Default Ollama bind address.
pub const DEFAULT_OLLAMA_HOST: &str = "127.0.0.1:11434";

const USER_AGENT: &str = concat!("veriassist/", env!("CARGO_PKG_VERSION"));

/// Connection settings and per-call time budgets.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// `host:port`, optionally with an `http://` / `https://` scheme.
    pub host: String,
    /// The `ollama` executable used for profile creation.
    pub cli: PathBuf,
    /// Budget for a readiness probe or a profile listing.
    pub request_timeout: Duration,
    /// Budget for opening a chat stream. Covers loading the model into
    /// memory, which can take minutes on a cold start.
    pub load_timeout: Duration,
    /// Longest allowed silence between two chunks of a chat stream.
    pub fragment_timeout: Duration,
    /// Budget for `ollama create` (may include pulling the base model).
    pub create_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_owned(),
            cli: PathBuf::from("ollama"),
            request_timeout: Duration::from_secs(30),
            load_timeout: Duration::from_secs(600),
            fragment_timeout: Duration::from_secs(120),
            create_timeout: Duration::from_secs(600),
        }
    }
}

/// Ollama API client.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    config: OllamaConfig,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ProfileInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url(&config.host),
            config,
        })
    }

    /// The HTTP root of the backend, e.g. `http://127.0.0.1:11434`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_connect() {
            BackendError::ServerNotRunning(self.base_url.clone())
        } else {
            BackendError::Http(e)
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await.map_err(|e| self.request_error(e))?;
        check_status(response).await
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        within("readiness probe", self.config.request_timeout, async {
            self.send(self.client.get(self.url("/api/version"))).await?;
            Ok(())
        })
        .await
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileInfo>, BackendError> {
        within("profile listing", self.config.request_timeout, async {
            let response = self.send(self.client.get(self.url("/api/tags"))).await?;
            let tags: TagsResponse = response.json().await?;
            Ok(tags.models)
        })
        .await
    }

    async fn create_profile(&self, name: &str, definition: &Path) -> Result<(), BackendError> {
        let mut command = Command::new(&self.config.cli);
        command
            .arg("create")
            .arg(name)
            .arg(format!("--file={}", definition.display()))
            .env("OLLAMA_HOST", &self.config.host)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(profile = %name, definition = %definition.display(), "running ollama create");

        let output = within("profile creation", self.config.create_timeout, async {
            Ok(command.output().await?)
        })
        .await?;

        if output.status.success() {
            info!(
                profile = %name,
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                "profile created"
            );
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(BackendError::CreateFailed {
                code: output.status.code(),
                stderr: if stderr.is_empty() { "unknown error".to_owned() } else { stderr },
            })
        }
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, BackendError> {
        let body = ChatBody {
            model: &request.profile,
            messages: &request.messages,
            stream: true,
            keep_alive: match request.keep_alive {
                KeepAlive::Default => None,
                KeepAlive::Forever => Some(-1),
            },
        };

        debug!(
            profile = %request.profile,
            messages = request.messages.len(),
            "opening chat stream"
        );

        let response = within("chat request", self.config.load_timeout, async {
            self.send(self.client.post(self.url("/api/chat")).json(&body)).await
        })
        .await?;

        let fragment_timeout = self.config.fragment_timeout;
        let mut bytes = Box::pin(response.bytes_stream());

        Ok(Box::pin(stream! {
            let mut lines = LineBuffer::default();
            let mut eof = false;
            loop {
                while let Some(line) = lines.next_line() {
                    match decode_line(&line) {
                        Ok(ChunkEvent::Fragment { text, done }) => {
                            yield Ok(text);
                            if done {
                                return;
                            }
                        }
                        Ok(ChunkEvent::Done) => return,
                        Ok(ChunkEvent::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                if eof {
                    break;
                }
                match tokio::time::timeout(fragment_timeout, bytes.next()).await {
                    Err(_) => {
                        yield Err(BackendError::timeout("waiting for the next fragment", fragment_timeout));
                        return;
                    }
                    Ok(None) => {
                        lines.finish();
                        eof = true;
                    }
                    Ok(Some(Err(e))) => {
                        yield Err(BackendError::Http(e));
                        return;
                    }
                    Ok(Some(Ok(chunk))) => lines.push(&chunk),
                }
            }
            yield Err(BackendError::Incomplete);
        }))
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

async fn within<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, BackendError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| BackendError::timeout(operation, limit))?
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    Err(BackendError::Status { status: status.as_u16(), body })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
