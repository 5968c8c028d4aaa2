//! Health Check Handler

use axum::Json;
use nettune_core::ApiResponse;
use serde_json::json;

/// GET /health - liveness, no auth required.
pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok(json!({"status": "ok"})))
}
