//! Apply engine
//!
//! Turns a declarative profile into a safe, reversible change to the live
//! kernel: snapshot, mutate, verify, and on any failure revert from the
//! snapshot. A single busy flag serialises apply and rollback; read paths
//! never take it.

use crate::history::HistoryLog;
use crate::profile::{self, ProfileStore};
use crate::snapshot::SnapshotStore;
use chrono::Utc;
use nettune_adapter::systemd::{generate_qdisc_script, generate_qdisc_unit};
use nettune_adapter::SystemAdapter;
use nettune_core::config::{MANAGED_SYSCTL_FILE, QDISC_SERVICE_NAME};
use nettune_core::value::normalize;
use nettune_core::{
    ApplyMode, ApplyPlan, ApplyRequest, ApplyResult, Change, NettuneError, Profile, QdiscConfig,
    Result, RollbackRequest, RollbackResult, SystemState, SystemStatus, VerificationResult,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The single mutator of kernel state. All other subsystems only observe.
pub struct ApplyEngine {
    profiles: Arc<ProfileStore>,
    snapshots: Arc<SnapshotStore>,
    history: Arc<HistoryLog>,
    adapter: SystemAdapter,
    busy: Arc<AtomicBool>,
}

/// RAII release of the busy flag, so every early return and panic path
/// frees the engine.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ApplyEngine {
    pub fn new(
        profiles: Arc<ProfileStore>,
        snapshots: Arc<SnapshotStore>,
        history: Arc<HistoryLog>,
        adapter: SystemAdapter,
    ) -> Self {
        Self {
            profiles,
            snapshots,
            history,
            adapter,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim exclusive mutation rights or fail fast. Contenders never queue:
    /// an operator watching a slow apply must get an immediate busy answer.
    fn try_begin(&self) -> Result<BusyGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(BusyGuard(self.busy.clone()))
        } else {
            Err(NettuneError::ApplyInProgress)
        }
    }

    /// Apply a profile. Dry-run computes and returns the plan without
    /// touching the system; commit snapshots, mutates, verifies and rolls
    /// back on any failure.
    pub async fn apply(&self, req: &ApplyRequest) -> Result<ApplyResult> {
        let _guard = self.try_begin()?;

        let profile = self.profiles.get(&req.profile_id).await?;
        profile::validate(&profile)?;

        let tracked = self.profiles.tracked_sysctl_keys().await;
        let current = self.snapshots.current_state(&tracked).await?;
        let plan = self.generate_plan(&profile, &current).await;

        let mut result = ApplyResult {
            mode: req.mode,
            profile_id: req.profile_id.clone(),
            plan,
            snapshot_id: None,
            success: false,
            verification: None,
            errors: Vec::new(),
            applied_at: None,
            auto_rollback_seconds: req.auto_rollback_seconds,
        };

        if req.mode == ApplyMode::DryRun {
            result.success = true;
            return Ok(result);
        }

        let snapshot = self.snapshots.create(&tracked).await?;
        result.snapshot_id = Some(snapshot.id.clone());

        if let Err(apply_err) = self.apply_changes(&profile).await {
            error!(profile = %profile.id, error = %apply_err, "apply failed, rolling back");
            let cause = format!("apply failed: {apply_err}");
            result.errors.push(self.recover(&snapshot.id, Some(cause)).await);
            self.history.record_apply(&profile.id, &snapshot.id, false).await;
            return Ok(result);
        }

        let verification = self.verify_changes(&profile).await;
        // Only sysctl and qdisc mismatches trigger rollback. An inactive
        // persistence unit is surfaced in the verification but does not
        // revert kernel state that verified.
        let verified = verification.sysctl_ok && verification.qdisc_ok;
        if !verified {
            result.errors.extend(verification.errors.iter().cloned());
        }
        result.verification = Some(verification);

        if !verified {
            error!(profile = %profile.id, "verification failed, rolling back");
            // the mismatches are already in result.errors
            result.errors.push(self.recover(&snapshot.id, None).await);
            self.history.record_apply(&profile.id, &snapshot.id, false).await;
            return Ok(result);
        }

        result.success = true;
        result.applied_at = Some(Utc::now());
        self.history.record_apply(&profile.id, &snapshot.id, true).await;
        info!(profile = %profile.id, snapshot = %snapshot.id, "applied profile");
        Ok(result)
    }

    /// Roll back after a failed apply, reporting both the original failure
    /// (when not already enumerated by the caller) and the outcome of the
    /// rollback attempt.
    async fn recover(&self, snapshot_id: &str, cause: Option<String>) -> String {
        let prefix = cause.map(|c| format!("{c}; ")).unwrap_or_default();
        match self.rollback_internal(snapshot_id).await {
            Ok(rollback) if rollback.success => format!("{prefix}rolled back"),
            Ok(rollback) => format!(
                "{prefix}rollback incomplete: {}",
                rollback.errors.join("; ")
            ),
            Err(e) => {
                error!(snapshot = snapshot_id, error = %e, "rollback failed");
                format!("{prefix}rollback also failed: {e}")
            }
        }
    }

    /// Restore a snapshot. Same exclusion rule as apply.
    pub async fn rollback(&self, req: &RollbackRequest) -> Result<RollbackResult> {
        let _guard = self.try_begin()?;

        let snapshot_id = match &req.snapshot_id {
            Some(id) => id.clone(),
            None if req.rollback_last => self
                .snapshots
                .latest()
                .await
                .ok_or_else(|| NettuneError::snapshot_not_found("latest"))?
                .id,
            None => {
                return Err(NettuneError::bad_request(
                    "either snapshot_id or rollback_last is required",
                ))
            }
        };

        self.rollback_internal(&snapshot_id).await
    }

    /// Best-effort restore; the caller must hold the busy flag. Individual
    /// step failures accumulate rather than abort, because partial
    /// restoration still beats none.
    async fn rollback_internal(&self, snapshot_id: &str) -> Result<RollbackResult> {
        let snapshot = self.snapshots.get(snapshot_id).await?;
        let mut errors: Vec<String> = Vec::new();

        for (path, content) in &snapshot.backups {
            if let Err(e) =
                nettune_core::fsutil::atomic_write(Path::new(path), content.as_bytes(), 0o644)
            {
                warn!(path = %path, error = %e, "failed to restore file");
                errors.push(format!("failed to restore {path}: {e}"));
            }
        }

        if snapshot.backups.contains_key(MANAGED_SYSCTL_FILE) {
            if let Err(e) = self
                .adapter
                .sysctl
                .load_from_file(Path::new(MANAGED_SYSCTL_FILE))
                .await
            {
                warn!(error = %e, "failed to reload persisted sysctl");
                errors.push(format!("failed to reload {MANAGED_SYSCTL_FILE}: {e}"));
            }
        }

        if !snapshot.state.sysctl.is_empty() {
            if let Err(e) = self.adapter.sysctl.set_many(&snapshot.state.sysctl).await {
                warn!(error = %e, "failed to restore sysctl values");
                errors.push(format!("failed to restore sysctl values: {e}"));
            }
        }

        for (iface, info) in &snapshot.state.qdisc {
            if let Err(e) = self
                .adapter
                .qdisc
                .set(iface, &info.kind, &BTreeMap::new())
                .await
            {
                warn!(iface = %iface, error = %e, "failed to restore qdisc");
                errors.push(format!("failed to restore qdisc on {iface}: {e}"));
            }
        }

        let success = errors.is_empty();
        self.history.record_rollback(snapshot_id, success).await;
        info!(snapshot = snapshot_id, success, "rolled back to snapshot");

        Ok(RollbackResult {
            snapshot_id: snapshot_id.to_string(),
            success,
            errors,
            restored_at: Some(Utc::now()),
        })
    }

    /// Aggregate view: current state + snapshot index + last apply.
    pub async fn status(&self) -> Result<SystemStatus> {
        let tracked = self.profiles.tracked_sysctl_keys().await;
        let current_state = self.snapshots.current_state(&tracked).await?;
        Ok(SystemStatus {
            current_state,
            snapshots_count: self.snapshots.count().await,
            latest_snapshot_id: self.snapshots.latest().await.map(|s| s.id),
            last_apply: self.history.last_apply().await,
        })
    }

    /// Pure diff of profile against current state. Values compare after
    /// normalisation, so a tab-separated kernel tuple equals its
    /// space-separated profile form.
    async fn generate_plan(&self, profile: &Profile, current: &SystemState) -> ApplyPlan {
        let mut plan = ApplyPlan::default();

        for (key, value) in &profile.sysctl {
            let from = current.sysctl.get(key).cloned().unwrap_or_default();
            let to = value.render();
            if normalize(&from) != normalize(&to) {
                plan.sysctl_changes.insert(key.clone(), Change { from, to });
            }
        }

        if let Some(qdisc) = &profile.qdisc {
            // Interface resolution failures leave the qdisc plan empty; the
            // commit path re-resolves and surfaces the error there.
            let interfaces = self.resolve_interfaces(qdisc).await.unwrap_or_default();
            for iface in interfaces {
                let from = current
                    .qdisc
                    .get(&iface)
                    .map(|q| q.kind.clone())
                    .unwrap_or_default();
                if from != qdisc.kind {
                    plan.qdisc_changes.insert(
                        iface,
                        Change {
                            from,
                            to: qdisc.kind.clone(),
                        },
                    );
                }
            }
        }

        if wants_qdisc_service(profile) {
            let active = current
                .systemd_units
                .get(QDISC_SERVICE_NAME)
                .copied()
                .unwrap_or(false);
            if !active {
                plan.systemd_changes.insert(
                    QDISC_SERVICE_NAME.to_string(),
                    Change {
                        from: "inactive".to_string(),
                        to: "active".to_string(),
                    },
                );
            }
        }

        plan
    }

    async fn resolve_interfaces(&self, qdisc: &QdiscConfig) -> Result<Vec<String>> {
        if qdisc.interfaces == "default-route" {
            Ok(vec![self.adapter.qdisc.default_route_interface().await?])
        } else {
            self.adapter.qdisc.list_interfaces().await
        }
    }

    /// Mutate in fixed order: sysctl (persist, then runtime), qdisc, then
    /// systemd. The first failure aborts and the caller reverts.
    async fn apply_changes(&self, profile: &Profile) -> Result<()> {
        if !profile.sysctl.is_empty() {
            let rendered: BTreeMap<String, String> = profile
                .sysctl
                .iter()
                .map(|(k, v)| (k.clone(), v.render()))
                .collect();

            self.adapter
                .sysctl
                .write_file(Path::new(MANAGED_SYSCTL_FILE), &rendered)
                .await
                .map_err(|e| NettuneError::adapter(format!("failed to write sysctl file: {e}")))?;

            self.adapter.sysctl.set_many(&rendered).await?;
        }

        if let Some(qdisc) = &profile.qdisc {
            let params: BTreeMap<String, String> = qdisc
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.render()))
                .collect();
            nettune_adapter::qdisc::validate_params(&qdisc.kind, &params)?;

            let interfaces = self.resolve_interfaces(qdisc).await?;
            for iface in &interfaces {
                self.adapter.qdisc.set(iface, &qdisc.kind, &params).await?;
            }

            // Boot persistence is best-effort: the live qdisc is already
            // set, so a unit that fails to install degrades the outcome
            // without aborting the apply. Verification surfaces it.
            if wants_qdisc_service(profile) {
                if let Err(e) = self
                    .ensure_qdisc_service(&qdisc.kind, &interfaces, &params)
                    .await
                {
                    warn!(error = %e, "failed to set up qdisc persistence service");
                }
            }
        }

        Ok(())
    }

    /// Install, enable and start the boot-persistence unit.
    async fn ensure_qdisc_service(
        &self,
        kind: &str,
        interfaces: &[String],
        params: &BTreeMap<String, String>,
    ) -> Result<()> {
        let script = generate_qdisc_script(kind, interfaces, params);
        self.adapter.systemd.install_qdisc_script(&script).await?;
        self.adapter
            .systemd
            .create_unit(QDISC_SERVICE_NAME, &generate_qdisc_unit())
            .await?;
        self.adapter.systemd.enable(QDISC_SERVICE_NAME).await?;
        self.adapter.systemd.start(QDISC_SERVICE_NAME).await?;
        Ok(())
    }

    /// Re-read everything the profile touched, after all writes completed.
    async fn verify_changes(&self, profile: &Profile) -> VerificationResult {
        let mut result = VerificationResult::default();

        for (key, value) in &profile.sysctl {
            match self.adapter.sysctl.get(key).await {
                Ok(actual) => {
                    let expected = value.render();
                    if normalize(&actual) != normalize(&expected) {
                        result.sysctl_ok = false;
                        result
                            .errors
                            .push(format!("sysctl {key}: expected {expected}, got {actual}"));
                    }
                }
                Err(e) => {
                    result.sysctl_ok = false;
                    result.errors.push(format!("failed to read sysctl {key}: {e}"));
                }
            }
        }

        if let Some(qdisc) = &profile.qdisc {
            let interfaces = self.resolve_interfaces(qdisc).await.unwrap_or_default();
            for iface in interfaces {
                match self.adapter.qdisc.get(&iface).await {
                    Ok(info) => {
                        if info.kind != qdisc.kind {
                            result.qdisc_ok = false;
                            result.errors.push(format!(
                                "qdisc {iface}: expected {}, got {}",
                                qdisc.kind, info.kind
                            ));
                        }
                    }
                    Err(e) => {
                        result.qdisc_ok = false;
                        result
                            .errors
                            .push(format!("failed to read qdisc for {iface}: {e}"));
                    }
                }
            }
        }

        if wants_qdisc_service(profile) {
            let active = self
                .adapter
                .systemd
                .is_active(QDISC_SERVICE_NAME)
                .await
                .unwrap_or(false);
            let enabled = self
                .adapter
                .systemd
                .is_enabled(QDISC_SERVICE_NAME)
                .await
                .unwrap_or(false);
            if !active || !enabled {
                result.systemd_ok = false;
                result.errors.push(format!(
                    "service {QDISC_SERVICE_NAME} is not active or enabled"
                ));
            }
        }

        result
    }
}

fn wants_qdisc_service(profile: &Profile) -> bool {
    profile
        .systemd
        .as_ref()
        .map(|s| s.ensure_qdisc_service)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{fake_adapter, FakeQdisc, FakeSysctl, FakeSystemd};
    use nettune_core::{QdiscInfo, SysctlValue, SystemdConfig};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        engine: Arc<ApplyEngine>,
        sysctl: Arc<FakeSysctl>,
        qdisc: Arc<FakeQdisc>,
        systemd: Arc<FakeSystemd>,
        snapshots: Arc<SnapshotStore>,
        history: Arc<HistoryLog>,
        _dir: TempDir,
    }

    async fn harness_with(profiles_to_save: Vec<Profile>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, sysctl, qdisc, systemd) = fake_adapter();

        let profiles = Arc::new(
            ProfileStore::new(dir.path().join("profiles")).await.unwrap(),
        );
        for p in &profiles_to_save {
            profiles.save(p).await.unwrap();
        }
        let snapshots = Arc::new(
            SnapshotStore::with_backup_paths(
                dir.path().join("snapshots"),
                adapter.clone(),
                Vec::new(),
            )
            .await
            .unwrap(),
        );
        let history = Arc::new(HistoryLog::new(dir.path().join("history")).await.unwrap());
        let engine = Arc::new(ApplyEngine::new(
            profiles,
            snapshots.clone(),
            history.clone(),
            adapter,
        ));

        Harness {
            engine,
            sysctl,
            qdisc,
            systemd,
            snapshots,
            history,
            _dir: dir,
        }
    }

    fn tuning_profile() -> Profile {
        let mut sysctl = BTreeMap::new();
        sysctl.insert("net.core.rmem_max".to_string(), SysctlValue::Int(16777216));
        Profile {
            id: "test-tune".to_string(),
            name: "Test tune".to_string(),
            description: String::new(),
            risk_level: "low".to_string(),
            requires_reboot: false,
            sysctl,
            qdisc: None,
            systemd: None,
        }
    }

    fn commit_request(profile_id: &str) -> ApplyRequest {
        ApplyRequest {
            profile_id: profile_id.to_string(),
            mode: ApplyMode::Commit,
            auto_rollback_seconds: None,
        }
    }

    #[tokio::test]
    async fn dry_run_shows_only_diffs_and_touches_nothing() {
        let h = harness_with(vec![tuning_profile()]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;

        let result = h
            .engine
            .apply(&ApplyRequest {
                profile_id: "test-tune".to_string(),
                mode: ApplyMode::DryRun,
                auto_rollback_seconds: Some(60),
            })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.auto_rollback_seconds, Some(60));
        assert_eq!(result.plan.sysctl_changes.len(), 1);
        let change = &result.plan.sysctl_changes["net.core.rmem_max"];
        assert_eq!(change.from, "212992");
        assert_eq!(change.to, "16777216");
        assert!(result.plan.qdisc_changes.is_empty());
        assert!(result.plan.systemd_changes.is_empty());

        // dry-run purity: no snapshot, no file, no kernel write
        assert!(result.snapshot_id.is_none());
        assert_eq!(h.snapshots.count().await, 0);
        assert!(h.sysctl.files.lock().await.is_empty());
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "212992");
        assert!(h.history.last_apply().await.is_none());
    }

    #[tokio::test]
    async fn whitespace_differences_are_not_changes() {
        let mut profile = tuning_profile();
        profile.sysctl.clear();
        profile.sysctl.insert(
            "net.ipv4.tcp_rmem".to_string(),
            SysctlValue::from("4096 131072 16777216"),
        );
        let h = harness_with(vec![profile]).await;
        // kernel reports the tuple tab-separated
        h.sysctl
            .insert("net.ipv4.tcp_rmem", "4096\t131072\t16777216")
            .await;

        let result = h
            .engine
            .apply(&ApplyRequest {
                profile_id: "test-tune".to_string(),
                mode: ApplyMode::DryRun,
                auto_rollback_seconds: None,
            })
            .await
            .unwrap();

        assert!(result.plan.is_empty());
    }

    #[tokio::test]
    async fn commit_applies_verifies_and_records_history() {
        let mut profile = tuning_profile();
        profile.qdisc = Some(QdiscConfig {
            kind: "fq".to_string(),
            interfaces: "default-route".to_string(),
            params: BTreeMap::new(),
        });
        profile.systemd = Some(SystemdConfig {
            ensure_qdisc_service: true,
        });
        let h = harness_with(vec![profile]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;
        h.qdisc
            .set_current(
                "eth0",
                QdiscInfo {
                    kind: "pfifo_fast".to_string(),
                    handle: "0".to_string(),
                    params: BTreeMap::new(),
                },
            )
            .await;

        let result = h.engine.apply(&commit_request("test-tune")).await.unwrap();

        assert!(result.success, "errors: {:?}", result.errors);
        assert!(result.applied_at.is_some());
        assert!(result.verification.as_ref().unwrap().ok());
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "16777216");
        assert_eq!(h.qdisc.kind_of("eth0").await.as_deref(), Some("fq"));

        // persistent file written before runtime apply
        let written = h
            .sysctl
            .written_file(Path::new(MANAGED_SYSCTL_FILE))
            .await
            .unwrap();
        assert_eq!(written["net.core.rmem_max"], "16777216");

        // boot persistence installed
        assert!(h.systemd.units.lock().await.contains_key(QDISC_SERVICE_NAME));
        let script = h.systemd.script.lock().await.clone().unwrap();
        assert!(script.contains("tc qdisc replace dev eth0 root fq"));
        assert!(h.systemd.active.lock().await.contains(QDISC_SERVICE_NAME));

        // snapshot captured pre-apply value
        let snapshot = h
            .snapshots
            .get(result.snapshot_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(snapshot.state.sysctl["net.core.rmem_max"], "212992");

        let last = h.history.last_apply().await.unwrap();
        assert!(last.success);
        assert_eq!(last.profile_id.as_deref(), Some("test-tune"));
    }

    #[tokio::test]
    async fn verification_miss_triggers_rollback() {
        let h = harness_with(vec![tuning_profile()]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;
        // kernel silently refuses the new value
        h.sysctl
            .silently_rejected
            .lock()
            .await
            .insert("net.core.rmem_max".to_string());

        let result = h.engine.apply(&commit_request("test-tune")).await.unwrap();

        assert!(!result.success);
        let verification = result.verification.unwrap();
        assert!(!verification.sysctl_ok);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("expected 16777216") && e.contains("212992")));
        assert!(result.errors.iter().any(|e| e == "rolled back"));

        // rollback recorded, value untouched
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "212992");
        let entries = h.history.entries().await;
        assert!(entries
            .iter()
            .any(|e| e.kind == nettune_core::HistoryKind::Rollback && e.success));
        let last = h.history.last_apply().await.unwrap();
        assert!(!last.success);
    }

    #[tokio::test]
    async fn systemd_degradation_does_not_revert_verified_tuning() {
        let mut profile = tuning_profile();
        profile.qdisc = Some(QdiscConfig {
            kind: "fq".to_string(),
            interfaces: "default-route".to_string(),
            params: BTreeMap::new(),
        });
        profile.systemd = Some(SystemdConfig {
            ensure_qdisc_service: true,
        });
        let h = harness_with(vec![profile]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;
        h.qdisc
            .set_current(
                "eth0",
                QdiscInfo {
                    kind: "pfifo_fast".to_string(),
                    handle: "0".to_string(),
                    params: BTreeMap::new(),
                },
            )
            .await;
        // the unit cannot be enabled, so it never becomes active
        *h.systemd.fail_enable.lock().await = true;

        let result = h.engine.apply(&commit_request("test-tune")).await.unwrap();

        // sysctl and qdisc verified, so the apply stands
        assert!(result.success, "errors: {:?}", result.errors);
        assert!(result.applied_at.is_some());
        let verification = result.verification.unwrap();
        assert!(verification.sysctl_ok);
        assert!(verification.qdisc_ok);
        assert!(!verification.systemd_ok);
        assert!(verification
            .errors
            .iter()
            .any(|e| e.contains(QDISC_SERVICE_NAME)));

        // tuning kept, nothing rolled back
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "16777216");
        assert_eq!(h.qdisc.kind_of("eth0").await.as_deref(), Some("fq"));
        assert!(!h
            .history
            .entries()
            .await
            .iter()
            .any(|e| e.kind == nettune_core::HistoryKind::Rollback));
        assert!(h.history.last_apply().await.unwrap().success);
    }

    #[tokio::test]
    async fn failed_mutation_is_rolled_back() {
        let h = harness_with(vec![tuning_profile()]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;
        *h.sysctl.fail_writes.lock().await = true;

        let result = h.engine.apply(&commit_request("test-tune")).await.unwrap();

        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.contains("apply failed")));
        // the snapshot still exists for manual retry
        assert_eq!(h.snapshots.count().await, 1);
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let h = harness_with(vec![]).await;
        let err = h.engine.apply(&commit_request("absent")).await.unwrap_err();
        assert_eq!(err.code(), "PROFILE_NOT_FOUND");
        assert_eq!(h.snapshots.count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_applies_fail_fast() {
        let h = harness_with(vec![tuning_profile()]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;
        *h.sysctl.write_delay.lock().await = Some(Duration::from_millis(100));

        let engine_a = h.engine.clone();
        let engine_b = h.engine.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { engine_a.apply(&commit_request("test-tune")).await }),
            tokio::spawn(async move { engine_b.apply(&commit_request("test-tune")).await }),
        );

        let outcomes = [a.unwrap(), b.unwrap()];
        let busy = outcomes
            .iter()
            .filter(|r| matches!(r, Err(NettuneError::ApplyInProgress)))
            .count();
        let completed = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(busy, 1, "exactly one caller must be rejected");
        assert_eq!(completed, 1);

        // the loser created no snapshot
        assert_eq!(h.snapshots.count().await, 1);
    }

    #[tokio::test]
    async fn apply_then_rollback_restores_snapshot_state() {
        let mut profile = tuning_profile();
        profile.qdisc = Some(QdiscConfig {
            kind: "fq".to_string(),
            interfaces: "default-route".to_string(),
            params: BTreeMap::new(),
        });
        let h = harness_with(vec![profile]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;
        h.qdisc
            .set_current(
                "eth0",
                QdiscInfo {
                    kind: "pfifo_fast".to_string(),
                    handle: "0".to_string(),
                    params: BTreeMap::new(),
                },
            )
            .await;

        let applied = h.engine.apply(&commit_request("test-tune")).await.unwrap();
        assert!(applied.success);
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "16777216");
        assert_eq!(h.qdisc.kind_of("eth0").await.as_deref(), Some("fq"));

        let rollback = h
            .engine
            .rollback(&RollbackRequest {
                snapshot_id: applied.snapshot_id.clone(),
                rollback_last: false,
            })
            .await
            .unwrap();

        assert!(rollback.success, "errors: {:?}", rollback.errors);
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "212992");
        assert_eq!(h.qdisc.kind_of("eth0").await.as_deref(), Some("pfifo_fast"));
    }

    #[tokio::test]
    async fn rollback_last_uses_latest_snapshot() {
        let h = harness_with(vec![tuning_profile()]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;

        let applied = h.engine.apply(&commit_request("test-tune")).await.unwrap();
        let rollback = h
            .engine
            .rollback(&RollbackRequest {
                snapshot_id: None,
                rollback_last: true,
            })
            .await
            .unwrap();

        assert_eq!(Some(rollback.snapshot_id), applied.snapshot_id);
        assert_eq!(h.sysctl.get_value("net.core.rmem_max").await.unwrap(), "212992");
    }

    #[tokio::test]
    async fn rollback_without_target_is_bad_request() {
        let h = harness_with(vec![]).await;
        let err = h
            .engine
            .rollback(&RollbackRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn rollback_missing_snapshot_is_not_found() {
        let h = harness_with(vec![]).await;
        let err = h
            .engine
            .rollback(&RollbackRequest {
                snapshot_id: Some("20000101000000000-deadbeef".to_string()),
                rollback_last: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_NOT_FOUND");
    }

    #[tokio::test]
    async fn status_joins_state_snapshots_and_history() {
        let h = harness_with(vec![tuning_profile()]).await;
        h.sysctl.insert("net.core.rmem_max", "212992").await;

        let before = h.engine.status().await.unwrap();
        assert_eq!(before.snapshots_count, 0);
        assert!(before.latest_snapshot_id.is_none());
        assert!(before.last_apply.is_none());

        let applied = h.engine.apply(&commit_request("test-tune")).await.unwrap();

        let after = h.engine.status().await.unwrap();
        assert_eq!(after.snapshots_count, 1);
        assert_eq!(after.latest_snapshot_id, applied.snapshot_id);
        assert_eq!(
            after.current_state.sysctl["net.core.rmem_max"],
            "16777216"
        );
        assert!(after.last_apply.unwrap().success);
    }
}
