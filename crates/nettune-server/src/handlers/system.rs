//! System Handlers - snapshots, apply, rollback and status.

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use nettune_core::{ApiResponse, ApplyRequest, NettuneError, RollbackRequest};
use serde_json::json;
use std::sync::Arc;

/// POST /sys/snapshot - capture and persist current state.
pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse>, NettuneError> {
    let tracked = state.profiles.tracked_sysctl_keys().await;
    let snapshot = state.snapshots.create(&tracked).await?;
    Ok(Json(ApiResponse::ok(json!({
        "snapshot_id": snapshot.id,
        "current_state": snapshot.state,
    }))))
}

/// GET /sys/snapshot/:id
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, NettuneError> {
    let snapshot = state.snapshots.get(&id).await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

/// GET /sys/snapshots - newest first.
pub async fn list_snapshots(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(state.snapshots.list().await))
}

/// POST /sys/apply - run the apply engine.
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApiResponse>, NettuneError> {
    let result = state.engine.apply(&request).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// POST /sys/rollback - restore a snapshot.
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RollbackRequest>,
) -> Result<Json<ApiResponse>, NettuneError> {
    let result = state.engine.rollback(&request).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// GET /sys/status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse>, NettuneError> {
    let status = state.engine.status().await?;
    Ok(Json(ApiResponse::ok(status)))
}
