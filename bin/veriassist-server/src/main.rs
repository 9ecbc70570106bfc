//! veriassist-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Load the system prompt and build the Ollama client.
//! 4. Start the backend startup sequence in a background task
//!    (launch, probe, provision, warm-up).
//! 5. Build the Axum router and start the HTTP server with graceful shutdown.
//!
//! The listener comes up immediately; chat requests wait (bounded) until the
//! backend is ready.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod startup;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use veriassist_core::backend::ollama::OllamaBackend;
use veriassist_core::launcher::BackendLauncher;
use veriassist_core::{ChatBackend, ProfileSpec};

use crate::config::Config;
use crate::startup::Startup;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: VERIASSIST_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "veriassist-server starting");

    // ── 3. Backend client ──────────────────────────────────────────────────────
    let system_prompt = cfg.system_prompt()?;
    let backend = OllamaBackend::new(cfg.ollama())?;
    info!(url = %backend.base_url(), profile = %cfg.profile_name, "using Ollama backend");
    let backend: Arc<dyn ChatBackend> = Arc::new(backend);

    // ── 4. Startup sequence ────────────────────────────────────────────────────
    let state = Arc::new(AppState::new(cfg.clone(), Arc::clone(&backend)));

    let startup = Startup {
        launcher: cfg
            .launch_backend
            .then(|| BackendLauncher::new(&cfg.ollama_bin, &cfg.ollama_host, &cfg.ollama_origins)),
        backend,
        profile: ProfileSpec::new(&cfg.profile_name, &cfg.base_model, system_prompt),
        artifact_dir: cfg.modelfile_dir.clone(),
        probe_timeout: cfg.startup_timeout,
    };
    startup.spawn(state.readiness.clone());

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("veriassist-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
