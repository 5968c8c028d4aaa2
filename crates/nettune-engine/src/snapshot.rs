//! Snapshot store
//!
//! Captures full pre-mutation system state: tracked sysctl keys, every root
//! qdisc, the managed unit's state, and byte-for-byte backups of the files
//! an apply may overwrite. Snapshots are immutable once written; ids sort
//! lexicographically so "latest" is the maximum.

use chrono::Utc;
use nettune_adapter::SystemAdapter;
use nettune_core::config::QDISC_SERVICE_NAME;
use nettune_core::fsutil;
use nettune_core::{NettuneError, Result, Snapshot, SystemState};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory-backed snapshot store with a sorted in-memory index.
pub struct SnapshotStore {
    dir: PathBuf,
    adapter: SystemAdapter,
    /// Files backed up into every snapshot.
    backup_paths: Vec<PathBuf>,
    cache: RwLock<BTreeMap<String, Snapshot>>,
}

impl SnapshotStore {
    /// Open (creating if needed) the snapshot directory and load existing
    /// snapshots.
    pub async fn new(dir: PathBuf, adapter: SystemAdapter) -> Result<Self> {
        let backup_paths = nettune_core::config::managed_paths()
            .into_iter()
            .map(PathBuf::from)
            .collect();
        Self::with_backup_paths(dir, adapter, backup_paths).await
    }

    /// As [`SnapshotStore::new`] but with explicit backup paths.
    pub async fn with_backup_paths(
        dir: PathBuf,
        adapter: SystemAdapter,
        backup_paths: Vec<PathBuf>,
    ) -> Result<Self> {
        fsutil::ensure_dir(&dir)?;

        let store = Self {
            dir,
            adapter,
            backup_paths,
            cache: RwLock::new(BTreeMap::new()),
        };
        store.load().await?;
        Ok(store)
    }

    async fn load(&self) -> Result<()> {
        let files = fsutil::list_files(&self.dir, ".json")?;
        let mut cache = self.cache.write().await;
        for file in files {
            let data = match std::fs::read_to_string(&file) {
                Ok(d) => d,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed to read snapshot file");
                    continue;
                }
            };
            match serde_json::from_str::<Snapshot>(&data) {
                Ok(snapshot) => {
                    cache.insert(snapshot.id.clone(), snapshot);
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed to parse snapshot file");
                }
            }
        }
        info!(count = cache.len(), "loaded snapshots");
        Ok(())
    }

    /// Read current state without persisting anything. `tracked_keys` is the
    /// sysctl key set to capture; keys the kernel does not know are skipped.
    pub async fn current_state(&self, tracked_keys: &[String]) -> Result<SystemState> {
        let mut state = SystemState::default();

        for key in tracked_keys {
            match self.adapter.sysctl.get(key).await {
                Ok(value) => {
                    state.sysctl.insert(key.clone(), value);
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "skipping unreadable sysctl key");
                }
            }
        }

        state.qdisc = self.adapter.qdisc.get_all().await?;

        let active = self
            .adapter
            .systemd
            .is_active(QDISC_SERVICE_NAME)
            .await
            .unwrap_or(false);
        state.systemd_units.insert(QDISC_SERVICE_NAME.to_string(), active);

        Ok(state)
    }

    /// Capture, persist and index a new snapshot.
    pub async fn create(&self, tracked_keys: &[String]) -> Result<Snapshot> {
        let state = self.current_state(tracked_keys).await?;

        let mut backups = BTreeMap::new();
        for path in &self.backup_paths {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    backups.insert(path.display().to_string(), content);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to back up file");
                }
            }
        }

        let snapshot = Snapshot {
            id: new_snapshot_id(),
            created_at: Utc::now(),
            state,
            backups,
        };

        let data = serde_json::to_string_pretty(&snapshot)?;
        let path = self.dir.join(format!("{}.json", snapshot.id));
        fsutil::atomic_write(&path, data.as_bytes(), 0o644)?;

        self.cache
            .write()
            .await
            .insert(snapshot.id.clone(), snapshot.clone());
        info!(id = %snapshot.id, "created snapshot");
        Ok(snapshot)
    }

    pub async fn get(&self, id: &str) -> Result<Snapshot> {
        let cache = self.cache.read().await;
        cache
            .get(id)
            .cloned()
            .ok_or_else(|| NettuneError::snapshot_not_found(id))
    }

    /// All snapshots, newest first.
    pub async fn list(&self) -> Vec<Snapshot> {
        let cache = self.cache.read().await;
        cache.values().rev().cloned().collect()
    }

    pub async fn latest(&self) -> Option<Snapshot> {
        let cache = self.cache.read().await;
        cache.values().next_back().cloned()
    }

    pub async fn count(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Timestamp-prefixed id: fixed-width UTC time plus a short random suffix.
/// Lexicographic order equals creation order down to the millisecond.
fn new_snapshot_id() -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S%3f");
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("{ts}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fake_adapter;
    use nettune_core::QdiscInfo;

    fn tracked() -> Vec<String> {
        vec![
            "net.core.rmem_max".to_string(),
            "net.ipv4.tcp_rmem".to_string(),
        ]
    }

    #[test]
    fn snapshot_ids_sort_by_creation() {
        let a = new_snapshot_id();
        let b = new_snapshot_id();
        assert_ne!(a, b);
        // fixed-width timestamp prefix carries the ordering
        assert!(a[..17] <= b[..17], "{a} should not sort after {b}");
        assert_eq!(a.len(), b.len());
    }

    #[tokio::test]
    async fn create_captures_tracked_state_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        let managed = dir.path().join("99-nettune.conf");
        std::fs::write(&managed, "net.core.rmem_max = 212992\n").unwrap();

        let (adapter, sysctl, qdisc, _systemd) = fake_adapter();
        sysctl.insert("net.core.rmem_max", "212992").await;
        sysctl.insert("net.ipv4.tcp_rmem", "4096\t131072\t6291456").await;
        qdisc
            .set_current(
                "eth0",
                QdiscInfo {
                    kind: "pfifo_fast".to_string(),
                    handle: "0".to_string(),
                    params: BTreeMap::new(),
                },
            )
            .await;

        let store = SnapshotStore::with_backup_paths(
            dir.path().join("snapshots"),
            adapter,
            vec![managed.clone()],
        )
        .await
        .unwrap();

        let snapshot = store.create(&tracked()).await.unwrap();
        assert_eq!(snapshot.state.sysctl["net.core.rmem_max"], "212992");
        assert_eq!(snapshot.state.qdisc["eth0"].kind, "pfifo_fast");
        assert_eq!(
            snapshot.backups[&managed.display().to_string()],
            "net.core.rmem_max = 212992\n"
        );
        assert!(snapshot.state.systemd_units.contains_key(QDISC_SERVICE_NAME));

        // persisted as one file per snapshot
        assert!(dir
            .path()
            .join("snapshots")
            .join(format!("{}.json", snapshot.id))
            .exists());
    }

    #[tokio::test]
    async fn missing_backup_files_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _sysctl, _qdisc, _systemd) = fake_adapter();
        let store = SnapshotStore::with_backup_paths(
            dir.path().to_path_buf(),
            adapter,
            vec![dir.path().join("does-not-exist.conf")],
        )
        .await
        .unwrap();

        let snapshot = store.create(&[]).await.unwrap();
        assert!(snapshot.backups.is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_latest_matches() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _sysctl, _qdisc, _systemd) = fake_adapter();
        let store =
            SnapshotStore::with_backup_paths(dir.path().to_path_buf(), adapter, Vec::new())
                .await
                .unwrap();

        let first = store.create(&[]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store.create(&[]).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(store.latest().await.unwrap().id, second.id);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn get_missing_is_snapshot_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _sysctl, _qdisc, _systemd) = fake_adapter();
        let store =
            SnapshotStore::with_backup_paths(dir.path().to_path_buf(), adapter, Vec::new())
                .await
                .unwrap();

        let err = store.get("nope").await.unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_NOT_FOUND");
    }

    #[tokio::test]
    async fn snapshots_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _s, _q, _d) = fake_adapter();
        let store = SnapshotStore::with_backup_paths(
            dir.path().to_path_buf(),
            adapter.clone(),
            Vec::new(),
        )
        .await
        .unwrap();
        let snapshot = store.create(&[]).await.unwrap();
        drop(store);

        let reopened =
            SnapshotStore::with_backup_paths(dir.path().to_path_buf(), adapter, Vec::new())
                .await
                .unwrap();
        assert_eq!(reopened.get(&snapshot.id).await.unwrap().id, snapshot.id);
    }
}
