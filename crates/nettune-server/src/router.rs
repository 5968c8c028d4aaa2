//! Route tree and middleware stack
//!
//! /health is public; everything else sits behind bearer auth. Rate
//! limiting and the body-size cap wrap the whole tree.

use crate::handlers::{health, probe, profiles, system};
use crate::middleware::{auth, ratelimit};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/probe/echo", get(probe::echo))
        .route("/probe/download", get(probe::download))
        .route("/probe/upload", post(probe::upload))
        .route("/probe/info", get(probe::server_info))
        .route("/profiles", get(profiles::list).post(profiles::create))
        .route("/profiles/:id", get(profiles::get))
        .route("/sys/snapshot", post(system::create_snapshot))
        .route("/sys/snapshot/:id", get(system::get_snapshot))
        .route("/sys/snapshots", get(system::list_snapshots))
        .route("/sys/apply", post(system::apply))
        .route("/sys/rollback", post(system::rollback))
        .route("/sys/status", get(system::status))
        .layer(from_fn_with_state(state.clone(), auth::require_bearer));

    let timeout = Duration::from_secs(state.config.read_timeout.max(state.config.write_timeout));

    Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), ratelimit::limit))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
