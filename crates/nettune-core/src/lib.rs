//! nettune-core: Shared Types and Utilities
//!
//! Provides:
//! - Profile / snapshot / plan / result data model
//! - Error taxonomy with wire error codes
//! - Sysctl value rendering and whitespace normalisation
//! - API response envelope
//! - Server and client configuration
//! - Atomic file utilities

pub mod api;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod probe;
pub mod types;
pub mod value;

pub use api::{ApiError, ApiResponse};
pub use config::{ClientConfig, ServerConfig};
pub use error::{NettuneError, Result};
pub use probe::{
    EchoResponse, LatencyStats, LatencyUnderLoadResult, RttResult, ServerInfo, ThroughputResult,
    UploadResponse,
};
pub use types::{
    ApplyMode, ApplyPlan, ApplyRequest, ApplyResult, Change, HistoryEntry, HistoryKind, Profile,
    ProfileMeta, QdiscConfig, QdiscInfo, RollbackRequest, RollbackResult, Snapshot, SystemState,
    SystemStatus, SystemdConfig, VerificationResult,
};
pub use value::{normalize, SysctlValue};
