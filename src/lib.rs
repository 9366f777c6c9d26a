//! Slipstream: a rewriting proxy that keeps third-party browsing on one
//! controlling origin.
//!
//! Everything the binary wires together lives here so integration tests in
//! `tests/` can drive the real router.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{any, get};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub mod access_log;
pub mod cli;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod guard;
pub mod origin;
pub mod proxy;
pub mod rewrite;

use access_log::{AccessEntry, AccessLog};
use proxy::fetcher::Fetcher;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub fetcher: Arc<dyn Fetcher>,
    pub access_log: AccessLog,
}

/// Builds the full router: health and log endpoints on fixed paths, the
/// proxy handler as the fallback for everything else.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/logs", get(recent_access_entries))
        // Proxy: catch everything else
        .fallback(any(proxy::handler::proxy_handler))
        .with_state(state)
        // Enforce 25 MB body size limit on all routes
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn(request_id_middleware))
}

async fn recent_access_entries(State(state): State<Arc<AppState>>) -> Json<Vec<AccessEntry>> {
    Json(state.access_log.snapshot())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with proxy logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}
