//! History log
//!
//! Append-only record of apply and rollback outcomes, persisted as JSON
//! lines so the file can be tailed and survives restarts. The most recent
//! apply entry answers "what was last applied".

use chrono::Utc;
use nettune_core::fsutil;
use nettune_core::{HistoryEntry, HistoryKind, Result};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{info, warn};

const HISTORY_FILE: &str = "history.jsonl";

/// File-backed append-only history.
pub struct HistoryLog {
    path: PathBuf,
    entries: RwLock<Vec<HistoryEntry>>,
}

impl HistoryLog {
    /// Open (creating if needed) the history directory and load past
    /// entries. Unparseable lines are skipped, never fatal.
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fsutil::ensure_dir(&dir)?;
        let path = dir.join(HISTORY_FILE);

        let mut entries = Vec::new();
        if let Ok(content) = std::fs::read_to_string(&path) {
            for line in content.lines() {
                match serde_json::from_str::<HistoryEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(error = %e, "skipping malformed history line"),
                }
            }
        }
        info!(count = entries.len(), "loaded history");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub async fn record_apply(&self, profile_id: &str, snapshot_id: &str, success: bool) {
        self.record(HistoryEntry {
            kind: HistoryKind::Apply,
            profile_id: Some(profile_id.to_string()),
            snapshot_id: snapshot_id.to_string(),
            success,
            timestamp: Utc::now(),
        })
        .await;
    }

    pub async fn record_rollback(&self, snapshot_id: &str, success: bool) {
        self.record(HistoryEntry {
            kind: HistoryKind::Rollback,
            profile_id: None,
            snapshot_id: snapshot_id.to_string(),
            success,
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn record(&self, entry: HistoryEntry) {
        if let Ok(line) = serde_json::to_string(&entry) {
            let appended = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .and_then(|mut f| {
                    use std::io::Write;
                    writeln!(f, "{line}")
                });
            if let Err(e) = appended {
                // History must never block an apply or rollback.
                warn!(error = %e, "failed to append history entry");
            }
        }
        self.entries.write().await.push(entry);
    }

    /// Most recent apply entry; rollbacks never count.
    pub async fn last_apply(&self) -> Option<HistoryEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .find(|e| e.kind == HistoryKind::Apply)
            .cloned()
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_apply_skips_rollbacks() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().to_path_buf()).await.unwrap();

        log.record_apply("bbr-throughput", "snap-1", true).await;
        log.record_rollback("snap-1", true).await;

        let last = log.last_apply().await.unwrap();
        assert_eq!(last.kind, HistoryKind::Apply);
        assert_eq!(last.profile_id.as_deref(), Some("bbr-throughput"));
        assert_eq!(last.snapshot_id, "snap-1");
        assert!(last.success);
    }

    #[tokio::test]
    async fn empty_history_has_no_last_apply() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().to_path_buf()).await.unwrap();
        assert!(log.last_apply().await.is_none());
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = HistoryLog::new(dir.path().to_path_buf()).await.unwrap();
            log.record_apply("low-latency", "snap-2", false).await;
            log.record_rollback("snap-2", true).await;
        }

        let log = HistoryLog::new(dir.path().to_path_buf()).await.unwrap();
        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, HistoryKind::Apply);
        assert!(!entries[0].success);
        assert_eq!(entries[1].kind, HistoryKind::Rollback);
    }
}
