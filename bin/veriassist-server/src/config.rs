//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use veriassist_core::backend::ollama::{DEFAULT_OLLAMA_HOST, OllamaConfig};

/// System prompt baked into the chat profile unless
/// `VERIASSIST_SYSTEM_PROMPT_FILE` names a replacement.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../assets/system_prompt.md");

/// Runtime configuration for veriassist-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"127.0.0.1:8000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Bind address of the Ollama server (its `OLLAMA_HOST`).
    pub ollama_host: String,

    /// Origin allow-list handed to the Ollama server (its `OLLAMA_ORIGINS`).
    pub ollama_origins: String,

    /// Path or name of the `ollama` executable.
    pub ollama_bin: PathBuf,

    /// Spawn `ollama serve` at startup.
    pub launch_backend: bool,

    /// Base model the chat profile is built from.
    pub base_model: String,

    /// Name of the chat profile on the backend.
    pub profile_name: String,

    /// Replace the built-in system prompt with the contents of this file.
    pub system_prompt_file: Option<PathBuf>,

    /// Directory for the short-lived profile definition file.
    pub modelfile_dir: PathBuf,

    /// Lower-case user messages before storing and sending them.
    pub lowercase_input: bool,

    /// How long startup polls the backend before giving up.
    pub startup_timeout: Duration,

    /// How long a chat request waits for startup to finish.
    pub ready_wait: Duration,

    /// Budget for a readiness probe or a profile listing.
    pub request_timeout: Duration,

    /// Budget for opening a chat stream, model load included.
    pub load_timeout: Duration,

    /// Longest allowed silence between two fragments.
    pub fragment_timeout: Duration,

    /// Budget for creating the chat profile.
    pub create_timeout: Duration,

    /// Sessions kept in memory before idle ones are evicted.
    pub max_sessions: usize,

    /// A session unused for this long may be evicted.
    pub session_idle: Duration,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("VERIASSIST_BIND", "127.0.0.1:8000"),
            log_level: env_or("VERIASSIST_LOG", "info"),
            log_json: env_flag("VERIASSIST_LOG_JSON", false),
            enable_swagger: env_flag("VERIASSIST_ENABLE_SWAGGER", true),
            cors_allowed_origins: std::env::var("VERIASSIST_CORS_ORIGINS").ok(),
            ollama_host: env_or("VERIASSIST_OLLAMA_HOST", DEFAULT_OLLAMA_HOST),
            ollama_origins: env_or("VERIASSIST_OLLAMA_ORIGINS", "*"),
            ollama_bin: PathBuf::from(env_or("VERIASSIST_OLLAMA_BIN", "ollama")),
            launch_backend: env_flag("VERIASSIST_LAUNCH_BACKEND", true),
            base_model: env_or("VERIASSIST_BASE_MODEL", "llama3.2"),
            profile_name: env_or("VERIASSIST_PROFILE_NAME", "veiassist_agent3"),
            system_prompt_file: std::env::var("VERIASSIST_SYSTEM_PROMPT_FILE").ok().map(PathBuf::from),
            modelfile_dir: std::env::var("VERIASSIST_MODELFILE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
            lowercase_input: env_flag("VERIASSIST_LOWERCASE_INPUT", true),
            startup_timeout: secs_env("VERIASSIST_STARTUP_TIMEOUT_SECS", 30),
            ready_wait: secs_env("VERIASSIST_READY_WAIT_SECS", 60),
            request_timeout: secs_env("VERIASSIST_REQUEST_TIMEOUT_SECS", 30),
            load_timeout: secs_env("VERIASSIST_LOAD_TIMEOUT_SECS", 600),
            fragment_timeout: secs_env("VERIASSIST_FRAGMENT_TIMEOUT_SECS", 120),
            create_timeout: secs_env("VERIASSIST_CREATE_TIMEOUT_SECS", 600),
            max_sessions: parse_env("VERIASSIST_MAX_SESSIONS", 1024),
            session_idle: secs_env("VERIASSIST_SESSION_IDLE_SECS", 3600),
        }
    }

    /// Connection settings for the Ollama client.
    pub fn ollama(&self) -> OllamaConfig {
        OllamaConfig {
            host: self.ollama_host.clone(),
            cli: self.ollama_bin.clone(),
            request_timeout: self.request_timeout,
            load_timeout: self.load_timeout,
            fragment_timeout: self.fragment_timeout,
            create_timeout: self.create_timeout,
        }
    }

    /// The system prompt to provision the chat profile with.
    ///
    /// Trailing whitespace is dropped; everything else is kept verbatim.
    pub fn system_prompt(&self) -> anyhow::Result<String> {
        let prompt = match &self.system_prompt_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read system prompt from {}", path.display()))?,
            None => DEFAULT_SYSTEM_PROMPT.to_owned(),
        };
        Ok(prompt.trim_end().to_owned())
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn secs_env(key: &str, default: u64) -> Duration {
    Duration::from_secs(parse_env(key, default))
}

#[cfg(test)]
impl Config {
    /// Defaults with short timeouts, independent of the process environment.
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            log_level: "info".into(),
            log_json: false,
            enable_swagger: false,
            cors_allowed_origins: None,
            ollama_host: DEFAULT_OLLAMA_HOST.into(),
            ollama_origins: "*".into(),
            ollama_bin: PathBuf::from("ollama"),
            launch_backend: false,
            base_model: "llama3.2".into(),
            profile_name: "veriassist".into(),
            system_prompt_file: None,
            modelfile_dir: std::env::temp_dir(),
            lowercase_input: true,
            startup_timeout: Duration::from_secs(1),
            ready_wait: Duration::from_millis(200),
            request_timeout: Duration::from_secs(1),
            load_timeout: Duration::from_secs(1),
            fragment_timeout: Duration::from_secs(1),
            create_timeout: Duration::from_secs(1),
            max_sessions: 16,
            session_idle: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn built_in_prompt_is_trimmed() {
        let prompt = Config::for_tests().system_prompt().unwrap();
        assert!(prompt.starts_with("You are VeriAssist"));
        assert!(prompt.ends_with("integrate them into your own writing."));
    }

    #[test]
    fn prompt_file_overrides_built_in() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "You are a test bot. 🧪").unwrap();

        let mut config = Config::for_tests();
        config.system_prompt_file = Some(file.path().to_path_buf());
        assert_eq!(config.system_prompt().unwrap(), "You are a test bot. 🧪");
    }

    #[test]
    fn ollama_settings_keep_load_and_request_budgets_apart() {
        let mut config = Config::for_tests();
        config.request_timeout = Duration::from_secs(30);
        config.load_timeout = Duration::from_secs(600);

        let ollama = config.ollama();
        assert_eq!(ollama.request_timeout, Duration::from_secs(30));
        assert_eq!(ollama.load_timeout, Duration::from_secs(600));
    }

    #[test]
    fn missing_prompt_file_is_an_error() {
        let mut config = Config::for_tests();
        config.system_prompt_file = Some(PathBuf::from("/nonexistent/veriassist/prompt.md"));
        let err = config.system_prompt().unwrap_err();
        assert!(err.to_string().contains("failed to read system prompt"));
    }
}
