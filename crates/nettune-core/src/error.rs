//! Error types for the nettune system

use thiserror::Error;

/// Core error type. Every variant maps onto a stable wire error code so the
/// HTTP layer and the MCP tools report failures uniformly.
#[derive(Error, Debug)]
pub enum NettuneError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("profile not found: {id}")]
    ProfileNotFound { id: String },

    #[error("snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    #[error("an apply or rollback is already in progress")]
    ApplyInProgress,

    #[error("adapter error: {message}")]
    Adapter { message: String },

    #[error("verification failed: {message}")]
    Verification { message: String },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("permission denied: {operation}")]
    PermissionDenied { operation: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl NettuneError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn profile_not_found(id: impl Into<String>) -> Self {
        Self::ProfileNotFound { id: id.into() }
    }

    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        Self::SnapshotNotFound { id: id.into() }
    }

    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter { message: message.into() }
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification { message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    pub fn permission_denied(operation: impl Into<String>) -> Self {
        Self::PermissionDenied { operation: operation.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Stable wire code for the API envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::ProfileNotFound { .. } => "PROFILE_NOT_FOUND",
            Self::SnapshotNotFound { .. } => "SNAPSHOT_NOT_FOUND",
            Self::ApplyInProgress => "APPLY_IN_PROGRESS",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::PermissionDenied { .. } => "INTERNAL",
            Self::Adapter { .. }
            | Self::Verification { .. }
            | Self::Io { .. }
            | Self::Serialization { .. }
            | Self::Internal { .. } => "INTERNAL",
        }
    }

    /// HTTP status the wire code travels with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::BadRequest { .. } => 400,
            Self::ProfileNotFound { .. } | Self::SnapshotNotFound { .. } => 404,
            Self::ApplyInProgress => 409,
            _ => 500,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, NettuneError>;

impl From<anyhow::Error> for NettuneError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal {
            message: error.to_string(),
        }
    }
}
