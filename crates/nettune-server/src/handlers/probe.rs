//! Probe Handlers
//!
//! The active-measurement surface: echo for RTT, bulk download/upload for
//! throughput, and server facts. These endpoints must stay responsive while
//! an apply holds the engine lock, so none of them touch the engine.

use crate::info;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chrono::Utc;
use futures::StreamExt;
use nettune_core::{ApiResponse, EchoResponse, NettuneError, UploadResponse};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const DOWNLOAD_CHUNK: usize = 64 * 1024;
const DEFAULT_DOWNLOAD_BYTES: u64 = 1024 * 1024;
const MAX_DOWNLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// GET /probe/echo - minimal round trip for RTT sampling.
pub async fn echo() -> Json<ApiResponse> {
    Json(ApiResponse::ok(EchoResponse {
        ts: Utc::now().timestamp_millis(),
        ok: true,
    }))
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub bytes: Option<u64>,
}

/// GET /probe/download?bytes=N - streamed zero-filled payload.
pub async fn download(Query(query): Query<DownloadQuery>) -> Result<Response, NettuneError> {
    let total = query.bytes.unwrap_or(DEFAULT_DOWNLOAD_BYTES);
    if total > MAX_DOWNLOAD_BYTES {
        return Err(NettuneError::bad_request(format!(
            "bytes must not exceed {MAX_DOWNLOAD_BYTES}"
        )));
    }

    let chunk = Bytes::from(vec![0u8; DOWNLOAD_CHUNK]);
    let stream = futures::stream::unfold(total, move |remaining| {
        let chunk = chunk.clone();
        async move {
            if remaining == 0 {
                return None;
            }
            let take = remaining.min(DOWNLOAD_CHUNK as u64) as usize;
            let part = chunk.slice(0..take);
            Some((Ok::<Bytes, std::io::Error>(part), remaining - take as u64))
        }
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, total)
        .body(Body::from_stream(stream))
        .map_err(|e| NettuneError::internal(e.to_string()))?;
    Ok(response)
}

/// POST /probe/upload - octet-stream sink; reports bytes and elapsed time.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> Result<Json<ApiResponse>, NettuneError> {
    let started = Instant::now();
    let cap = state.config.max_body_bytes as u64;

    let mut received: u64 = 0;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| NettuneError::internal(format!("upload read failed: {e}")))?;
        received += chunk.len() as u64;
        if received > cap {
            return Err(NettuneError::bad_request("request body too large"));
        }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    debug!(received, duration_ms, "upload probe complete");
    Ok(Json(ApiResponse::ok(UploadResponse {
        received_bytes: received,
        duration_ms,
    })))
}

/// GET /probe/info - static server facts.
pub async fn server_info(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(info::collect(&state.adapter).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn download_streams_exact_byte_count() {
        let response = download(Query(DownloadQuery { bytes: Some(200_000) }))
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.len(), 200_000);
    }

    #[tokio::test]
    async fn download_rejects_oversized_requests() {
        let err = download(Query(DownloadQuery {
            bytes: Some(MAX_DOWNLOAD_BYTES + 1),
        }))
        .await
        .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn echo_reports_ok() {
        let Json(resp) = echo().await;
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["ok"], true);
        assert!(data["ts"].as_i64().unwrap() > 0);
    }
}
