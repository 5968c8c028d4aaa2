//! Bearer token authentication
//!
//! Every route except GET /health requires `Authorization: Bearer <key>`
//! matching the configured API key.

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use nettune_core::ApiResponse;
use std::sync::Arc;
use tracing::debug;

/// Pull the bearer token out of the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("authorization")?.to_str().ok()?;
    let token = raw.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Reject requests whose bearer token does not match the API key.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match extract_bearer_token(request.headers()) {
        Some(token) if token == state.config.api_key => next.run(request).await,
        Some(_) => {
            debug!(path = %request.uri().path(), "rejected request with wrong token");
            unauthorized("invalid API key")
        }
        None => {
            debug!(path = %request.uri().path(), "rejected request without token");
            unauthorized("missing bearer token")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::error("UNAUTHORIZED", message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        let headers = headers_with("Bearer secret-key");
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("secret-key"));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let headers = headers_with("  Bearer   secret-key  ");
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("secret-key"));
    }

    #[test]
    fn rejects_non_bearer_schemes() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[test]
    fn rejects_empty_token() {
        let headers = headers_with("Bearer ");
        assert!(extract_bearer_token(&headers).is_none());
        assert!(extract_bearer_token(&HeaderMap::new()).is_none());
    }
}
