//! Core data model: profiles, system state, snapshots, plans and results.

use crate::value::SysctlValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declarative tuning change set. Immutable once validated; the engine
/// never mutates a profile, it only diffs it against live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk_level: String,
    #[serde(default)]
    pub requires_reboot: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sysctl: BTreeMap<String, SysctlValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qdisc: Option<QdiscConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systemd: Option<SystemdConfig>,
}

impl Profile {
    pub fn to_meta(&self) -> ProfileMeta {
        ProfileMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            risk_level: self.risk_level.clone(),
            requires_reboot: self.requires_reboot,
        }
    }
}

/// Listing view of a profile, without the change set itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk_level: String,
    #[serde(default)]
    pub requires_reboot: bool,
}

/// Root qdisc section of a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdiscConfig {
    /// Qdisc type: fq, fq_codel, cake or pfifo_fast.
    #[serde(rename = "type")]
    pub kind: String,
    /// Target selection: "default-route" or "all".
    pub interfaces: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, SysctlValue>,
}

/// Systemd section of a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemdConfig {
    #[serde(default)]
    pub ensure_qdisc_service: bool,
}

/// Parsed root qdisc of one interface, as reported by `tc qdisc show`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdiscInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// Captured system state, limited to what profiles can touch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default)]
    pub sysctl: BTreeMap<String, String>,
    #[serde(default)]
    pub qdisc: BTreeMap<String, QdiscInfo>,
    #[serde(default)]
    pub systemd_units: BTreeMap<String, bool>,
}

/// A persisted point-in-time capture sufficient to revert one apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub state: SystemState,
    /// Full prior contents of every file an apply may overwrite, keyed by
    /// absolute path.
    #[serde(default)]
    pub backups: BTreeMap<String, String>,
}

/// One planned transition for a single key or interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub from: String,
    pub to: String,
}

/// Diff between a profile and current state. No-op entries are omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyPlan {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sysctl_changes: BTreeMap<String, Change>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qdisc_changes: BTreeMap<String, Change>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub systemd_changes: BTreeMap<String, Change>,
}

impl ApplyPlan {
    pub fn is_empty(&self) -> bool {
        self.sysctl_changes.is_empty()
            && self.qdisc_changes.is_empty()
            && self.systemd_changes.is_empty()
    }
}

/// Apply mode: preview or mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    DryRun,
    Commit,
}

/// Request body for POST /sys/apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub profile_id: String,
    pub mode: ApplyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_rollback_seconds: Option<u64>,
}

/// Post-mutation verification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub sysctl_ok: bool,
    pub qdisc_ok: bool,
    pub systemd_ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl VerificationResult {
    /// Whether every sub-check passed, the persistence unit included. The
    /// engine's rollback decision is narrower: it ignores `systemd_ok`.
    pub fn ok(&self) -> bool {
        self.sysctl_ok && self.qdisc_ok && self.systemd_ok
    }
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self {
            sysctl_ok: true,
            qdisc_ok: true,
            systemd_ok: true,
            errors: Vec::new(),
        }
    }
}

/// Outcome of an apply request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub mode: ApplyMode,
    pub profile_id: String,
    pub plan: ApplyPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// Advisory operator hint echoed back from the request. The engine does
    /// not arm a timer; re-invoking rollback is the operator's call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_rollback_seconds: Option<u64>,
}

/// Request body for POST /sys/rollback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub rollback_last: bool,
}

/// Outcome of a rollback. Restoration is best-effort: individual step
/// failures accumulate in `errors` without aborting later steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub snapshot_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

/// Kind of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Apply,
    Rollback,
}

/// Append-only record of one apply or rollback outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub snapshot_id: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view for GET /sys/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub current_state: SystemState,
    pub snapshots_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_apply: Option<HistoryEntry>,
}
