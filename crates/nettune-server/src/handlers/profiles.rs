//! Profile Handlers

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use nettune_core::{ApiResponse, NettuneError, Profile};
use serde_json::json;
use std::sync::Arc;

/// GET /profiles - list metadata for every loaded profile.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    let profiles = state.profiles.list().await;
    Json(ApiResponse::ok(json!({ "profiles": profiles })))
}

/// GET /profiles/:id - full profile.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, NettuneError> {
    let profile = state.profiles.get(&id).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// POST /profiles - validate and persist a new profile.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<Profile>,
) -> Result<Json<ApiResponse>, NettuneError> {
    state.profiles.save(&profile).await?;
    Ok(Json(ApiResponse::ok(profile.to_meta())))
}
