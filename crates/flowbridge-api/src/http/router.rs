//! Axum router configuration with middleware.
//!
//! Lifecycle callbacks are matched first; `/api/*` goes to the engine API
//! without provisioning and every other path falls through to the engine UI
//! proxy, which provisions first-time callers.

use axum::Router;
use axum::routing::{any, get, post, put};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/heartbeat", get(handlers::lifecycle::heartbeat))
        .route("/init", post(handlers::lifecycle::init))
        .route("/enabled", put(handlers::lifecycle::set_enabled))
        .route("/api/{*path}", any(handlers::proxy::proxy_api))
        .fallback(handlers::proxy::proxy_ui)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
