//! HTTP server: `POST /verify` plus the static landing page at `/`.

mod handlers;
mod intake;
mod response;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use hashmatch_core::config::HashmatchConfig;
use hashmatch_core::verify::Verifier;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Per-server state shared by all handlers. Read-only after startup.
#[derive(Debug, Clone)]
pub struct AppState {
    pub verifier: Verifier,
    pub max_upload_bytes: u64,
    pub static_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn from_config(cfg: &HashmatchConfig) -> Self {
        Self {
            verifier: Verifier::from_config(cfg),
            max_upload_bytes: cfg.max_upload_bytes,
            static_dir: Arc::new(cfg.static_dir.clone()),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route(
            "/verify",
            post(handlers::verify)
                .fallback(handlers::method_not_allowed)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/", get(handlers::index))
        .with_state(state)
}

/// Log whether the landing page can be served. A missing page is not fatal.
fn check_static_dir(static_dir: &std::path::Path) {
    let index = static_dir.join("index.html");
    if index.is_file() {
        tracing::info!("serving landing page from {}", index.display());
    } else {
        tracing::warn!(
            "{} not found; the web page will be unavailable (API still works)",
            index.display()
        );
    }
}

/// Bind `cfg.listen_addr` and serve until Ctrl-C.
pub async fn run(cfg: &HashmatchConfig) -> Result<()> {
    check_static_dir(&cfg.static_dir);
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        max_upload = %cfg.max_upload_display(),
        fetch_timeout_secs = cfg.fetch_timeout_secs,
        "hashmatch server listening"
    );
    println!("hashmatch listening on http://{}", addr);

    axum::serve(listener, create_router(AppState::from_config(cfg)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    tracing::info!("hashmatch server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler: {}", e);
        std::future::pending::<()>().await;
    }
}
