//! Application State
//!
//! Central state shared across all handlers. Built once at startup; the
//! stores and the engine are wired here.

use crate::middleware::ratelimit::RateLimiter;
use nettune_adapter::SystemAdapter;
use nettune_core::{Result, ServerConfig};
use nettune_engine::{ApplyEngine, HistoryLog, ProfileStore, SnapshotStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Application state shared across all handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub adapter: SystemAdapter,
    pub profiles: Arc<ProfileStore>,
    pub snapshots: Arc<SnapshotStore>,
    pub history: Arc<HistoryLog>,
    pub engine: Arc<ApplyEngine>,
    pub rate_limiter: RateLimiter,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// State backed by the real system tools.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>> {
        Self::with_adapter(config, SystemAdapter::new()).await
    }

    /// State over an explicit adapter (tests use fakes here).
    pub async fn with_adapter(config: ServerConfig, adapter: SystemAdapter) -> Result<Arc<Self>> {
        info!(state_dir = %config.state_dir.display(), "initializing application state");

        let profiles = Arc::new(ProfileStore::new(config.profiles_dir()).await?);
        let snapshots = Arc::new(
            SnapshotStore::new(config.snapshots_dir(), adapter.clone()).await?,
        );
        let history = Arc::new(HistoryLog::new(config.history_dir()).await?);
        let engine = Arc::new(ApplyEngine::new(
            profiles.clone(),
            snapshots.clone(),
            history.clone(),
            adapter.clone(),
        ));

        let rate_limiter = RateLimiter::new(
            config.rate_limit,
            config.rate_burst,
            Duration::from_secs(60),
        );

        Ok(Arc::new(Self {
            config,
            adapter,
            profiles,
            snapshots,
            history,
            engine,
            rate_limiter,
            start_time: std::time::Instant::now(),
        }))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
