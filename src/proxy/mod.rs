//! Relay server: forwards chat actions to the remote Gradio app.
//!
//! One route, `POST {proxy.path}`, accepts a JSON action envelope or a
//! multipart upload and answers `{"data": [...]}` with the remote output
//! unchanged. Every request is independent: it opens its own Gradio
//! connection and shares nothing mutable with other requests.
//!
//! ```text
//! POST {path}   JSON      {action, user_input?, chat_history?, bot_name?}
//! POST {path}   multipart {action?, file}
//! *    {path}             → 405
//! ```

mod dispatch;

pub use dispatch::ProxyError;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;

// ── Shared request state ──────────────────────────────────────────────────────

/// Router state injected into the handler via [`axum::extract::State`].
///
/// Immutable after startup and cheap to clone.
#[derive(Clone)]
pub struct ProxyState {
    /// Pooled HTTP client used for every Gradio connection.
    pub http: reqwest::Client,
    /// Remote Gradio base URL; `None` when unconfigured.
    pub gradio_url: Option<Arc<str>>,
    pub max_body_bytes: usize,
}

impl ProxyState {
    pub fn new(gradio_url: Option<&str>, max_body_bytes: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            gradio_url: gradio_url.map(Arc::from),
            max_body_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gradio_api_url.as_deref(), config.proxy.max_body_bytes)
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the relay router. `cors` adds permissive CORS headers so a browser
/// front-end served from another origin can call it.
pub fn build_router(state: ProxyState, path: &str, cors: bool) -> Router {
    let limit = state.max_body_bytes;
    let router = Router::new()
        .route(
            path,
            post(dispatch::gradio_proxy).fallback(dispatch::method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state);

    if cors { router.layer(CorsLayer::permissive()) } else { router }
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind, serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn serve(config: &Config, shutdown: CancellationToken) -> Result<(), AppError> {
    let state = ProxyState::from_config(config);
    if state.gradio_url.is_none() {
        warn!("GRADIO_API_URL is not configured; every relay request will fail with 500");
    }

    let router = build_router(state, &config.proxy.path, config.proxy.cors);
    let bind_addr = &config.proxy.bind;

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(
        %bind_addr,
        path = %config.proxy.path,
        gradio_url = config.gradio_api_url.as_deref().unwrap_or("<unset>"),
        cors = config.proxy.cors,
        "relay listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("relay server error: {e}")))?;

    info!("relay shut down");
    Ok(())
}
