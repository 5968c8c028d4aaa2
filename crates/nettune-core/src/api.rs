//! API response envelope
//!
//! Every JSON endpoint answers `{success, data?, error?}` where `error` is
//! `{code, message}`. The MCP layer and the CLI both rely on this shape.

use crate::error::NettuneError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Uniform response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

impl From<&NettuneError> for ApiResponse {
    fn from(err: &NettuneError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

impl IntoResponse for NettuneError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_wraps_data() {
        let resp = ApiResponse::ok(serde_json::json!({"status": "ok"}));
        assert!(resp.success);
        assert!(resp.error.is_none());
        assert_eq!(resp.data.unwrap()["status"], "ok");
    }

    #[test]
    fn error_envelope_carries_code() {
        let resp = ApiResponse::from(&NettuneError::ApplyInProgress);
        assert!(!resp.success);
        let err = resp.error.unwrap();
        assert_eq!(err.code, "APPLY_IN_PROGRESS");
    }
}
