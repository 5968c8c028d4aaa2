//! Tool definitions and dispatch
//!
//! Each tool knows only how its arguments map onto an HTTP request shape.
//! Descriptions are written for an LLM operator: say when to reach for the
//! tool, not just what it does.

use crate::http::Client;
use crate::probe::{LatencyLoadTester, RttTester, ThroughputTester};
use nettune_core::{
    ApplyMode, ApplyRequest, Profile, QdiscConfig, RollbackRequest, SysctlValue, SystemdConfig,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// The nettune tool set bound over one HTTP client.
pub struct NettuneTools {
    client: Client,
    rtt: RttTester,
    throughput: ThroughputTester,
    load: LatencyLoadTester,
}

impl NettuneTools {
    pub fn new(client: Client) -> Self {
        Self {
            rtt: RttTester::new(client.clone()),
            throughput: ThroughputTester::new(client.clone()),
            load: LatencyLoadTester::new(client.clone()),
            client,
        }
    }

    /// Tool definitions for tools/list.
    pub fn definitions() -> Vec<Value> {
        vec![
            json!({
                "name": "nettune.test_rtt",
                "description": "Measure RTT to the server. Returns min/max/mean/p50/p90/p99 latencies, jitter and error rate.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "count": {"type": "number", "description": "Number of echo requests (default: 30)"},
                        "concurrency": {"type": "number", "description": "Concurrent requests (default: 1)"}
                    }
                }
            }),
            json!({
                "name": "nettune.test_throughput",
                "description": "Measure upload or download bandwidth to the server. Use iterations > 1 for stable numbers, parallel 4-8 to saturate fast links.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "direction": {"type": "string", "enum": ["download", "upload"], "description": "Transfer direction"},
                        "bytes": {"type": "number", "description": "Bytes per iteration (default: 100MB)"},
                        "parallel": {"type": "number", "description": "Parallel connections (default: 1)"},
                        "iterations": {"type": "number", "description": "Iterations to average (default: 1)"}
                    },
                    "required": ["direction"]
                }
            }),
            json!({
                "name": "nettune.test_latency_under_load",
                "description": "Detect bufferbloat: compares baseline RTT against RTT while parallel downloads saturate the link.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "duration": {"type": "number", "description": "Load duration in seconds (default: 10)"},
                        "load_parallel": {"type": "number", "description": "Parallel load connections (default: 4)"},
                        "echo_interval": {"type": "number", "description": "Echo probe interval in ms (default: 100)"}
                    }
                }
            }),
            json!({
                "name": "nettune.snapshot_server",
                "description": "Snapshot current server configuration so changes can be rolled back.",
                "inputSchema": {"type": "object", "properties": {}}
            }),
            json!({
                "name": "nettune.list_profiles",
                "description": "List the tuning profiles available on the server.",
                "inputSchema": {"type": "object", "properties": {}}
            }),
            json!({
                "name": "nettune.show_profile",
                "description": "Show the full change set of one profile.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "profile_id": {"type": "string", "description": "Profile id"}
                    },
                    "required": ["profile_id"]
                }
            }),
            json!({
                "name": "nettune.create_profile",
                "description": "Create a new tuning profile on the server. Apply it afterwards with nettune.apply_profile.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "description": "Unique id, lowercase alphanumeric with hyphens"},
                        "name": {"type": "string", "description": "Display name"},
                        "description": {"type": "string", "description": "What this profile does and when to use it"},
                        "risk_level": {"type": "string", "enum": ["low", "medium", "high"]},
                        "requires_reboot": {"type": "boolean", "description": "Whether a reboot is needed (default: false)"},
                        "sysctl": {"type": "object", "description": "Sysctl key -> value map, e.g. {\"net.core.rmem_max\": 33554432}"},
                        "qdisc_type": {"type": "string", "enum": ["fq", "fq_codel", "cake", "pfifo_fast"]},
                        "qdisc_interfaces": {"type": "string", "enum": ["default-route", "all"], "description": "Target interfaces (default: default-route)"},
                        "qdisc_params": {"type": "object", "description": "Extra qdisc parameters; each type has its own allow-list"},
                        "systemd_ensure_qdisc_service": {"type": "boolean", "description": "Persist the qdisc across reboots via a systemd unit"}
                    },
                    "required": ["id", "name", "risk_level"]
                }
            }),
            json!({
                "name": "nettune.apply_profile",
                "description": "Apply a profile. Always run mode=dry_run first to preview the plan, then mode=commit.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "profile_id": {"type": "string", "description": "Profile to apply"},
                        "mode": {"type": "string", "enum": ["dry_run", "commit"], "description": "dry_run previews, commit mutates"},
                        "auto_rollback_seconds": {"type": "number", "description": "Advisory: how long to wait before deciding the change broke connectivity (default: 60)"}
                    },
                    "required": ["profile_id", "mode"]
                }
            }),
            json!({
                "name": "nettune.rollback",
                "description": "Restore a configuration snapshot. Pass rollback_last=true for the most recent one.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "snapshot_id": {"type": "string", "description": "Snapshot to restore"},
                        "rollback_last": {"type": "boolean", "description": "Restore the most recent snapshot"}
                    }
                }
            }),
            json!({
                "name": "nettune.status",
                "description": "Current system state, snapshot count, last apply and server facts.",
                "inputSchema": {"type": "object", "properties": {}}
            }),
        ]
    }

    /// Execute one tool call. The Err string becomes isError text content.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<Value, String> {
        match name {
            "nettune.test_rtt" => {
                let count = get_usize(args, "count", 30);
                let concurrency = get_usize(args, "concurrency", 1);
                let result = self.rtt.test(count, concurrency).await.map_err(fmt_err)?;
                to_value(result)
            }
            "nettune.test_throughput" => {
                let direction = get_str(args, "direction").unwrap_or("download");
                let bytes = get_u64(args, "bytes", 100 * 1024 * 1024);
                let parallel = get_usize(args, "parallel", 1);
                let iterations = get_usize(args, "iterations", 1);
                let result = if direction == "upload" {
                    self.throughput.test_upload(bytes, parallel, iterations).await
                } else {
                    self.throughput.test_download(bytes, parallel, iterations).await
                }
                .map_err(fmt_err)?;
                to_value(result)
            }
            "nettune.test_latency_under_load" => {
                let duration = get_u64(args, "duration", 10);
                let load_parallel = get_usize(args, "load_parallel", 4);
                let echo_interval = get_u64(args, "echo_interval", 100);
                let result = self
                    .load
                    .test(duration, load_parallel, echo_interval)
                    .await
                    .map_err(fmt_err)?;
                to_value(result)
            }
            "nettune.snapshot_server" => {
                let (snapshot_id, current_state) =
                    self.client.create_snapshot().await.map_err(fmt_err)?;
                Ok(json!({
                    "snapshot_id": snapshot_id,
                    "current_state": current_state,
                }))
            }
            "nettune.list_profiles" => {
                let profiles = self.client.list_profiles().await.map_err(fmt_err)?;
                Ok(json!({ "profiles": profiles }))
            }
            "nettune.show_profile" => {
                let id = get_str(args, "profile_id")
                    .ok_or("profile_id is required; use nettune.list_profiles to see what exists")?;
                let profile = self.client.get_profile(id).await.map_err(|e| {
                    hint_not_found(e, &format!(
                        "profile '{id}' not found; use nettune.list_profiles or nettune.create_profile"
                    ))
                })?;
                to_value(profile)
            }
            "nettune.create_profile" => {
                let profile = profile_from_args(args)?;
                let meta = self.client.create_profile(&profile).await.map_err(fmt_err)?;
                Ok(json!({
                    "message": format!("profile '{}' created", meta.id),
                    "profile": meta,
                }))
            }
            "nettune.apply_profile" => {
                let profile_id = get_str(args, "profile_id")
                    .ok_or("profile_id is required; use nettune.list_profiles to see what exists")?;
                let mode = match get_str(args, "mode").unwrap_or("dry_run") {
                    "commit" => ApplyMode::Commit,
                    _ => ApplyMode::DryRun,
                };
                let request = ApplyRequest {
                    profile_id: profile_id.to_string(),
                    mode,
                    auto_rollback_seconds: Some(get_u64(args, "auto_rollback_seconds", 60)),
                };
                let result = self.client.apply(&request).await.map_err(|e| {
                    hint_not_found(e, &format!(
                        "profile '{profile_id}' not found; use nettune.list_profiles or nettune.create_profile"
                    ))
                })?;
                to_value(result)
            }
            "nettune.rollback" => {
                let snapshot_id = get_str(args, "snapshot_id").map(str::to_string);
                let rollback_last = get_bool(args, "rollback_last", false);
                if snapshot_id.is_none() && !rollback_last {
                    return Err(
                        "either snapshot_id or rollback_last=true is required; use rollback_last=true for the most recent snapshot"
                            .to_string(),
                    );
                }
                let result = self
                    .client
                    .rollback(&RollbackRequest {
                        snapshot_id,
                        rollback_last,
                    })
                    .await
                    .map_err(|e| {
                        hint_not_found(
                            e,
                            "snapshot not found; create one with nettune.snapshot_server before applying changes",
                        )
                    })?;
                to_value(result)
            }
            "nettune.status" => {
                let status = self.client.status().await.map_err(fmt_err)?;
                // server facts are best-effort garnish on the status
                match self.client.probe_info().await {
                    Ok(info) => Ok(json!({ "status": status, "server_info": info })),
                    Err(_) => Ok(json!({ "status": status })),
                }
            }
            _ => Err(format!("unknown tool: {name}")),
        }
    }
}

/// Assemble a Profile from flat tool arguments.
fn profile_from_args(args: &Value) -> Result<Profile, String> {
    let id = get_str(args, "id").ok_or("id is required")?;
    let name = get_str(args, "name").ok_or("name is required")?;
    let risk_level = get_str(args, "risk_level").ok_or("risk_level is required")?;

    let sysctl: BTreeMap<String, SysctlValue> = match args.get("sysctl") {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())
            .map_err(|e| format!("invalid sysctl map: {e}"))?,
        _ => BTreeMap::new(),
    };

    let qdisc = match get_str(args, "qdisc_type") {
        Some(kind) => {
            let params: BTreeMap<String, SysctlValue> = match args.get("qdisc_params") {
                Some(value) if !value.is_null() => serde_json::from_value(value.clone())
                    .map_err(|e| format!("invalid qdisc_params map: {e}"))?,
                _ => BTreeMap::new(),
            };
            Some(QdiscConfig {
                kind: kind.to_string(),
                interfaces: get_str(args, "qdisc_interfaces")
                    .unwrap_or("default-route")
                    .to_string(),
                params,
            })
        }
        None => None,
    };

    let systemd = if get_bool(args, "systemd_ensure_qdisc_service", false) {
        Some(SystemdConfig {
            ensure_qdisc_service: true,
        })
    } else {
        None
    };

    Ok(Profile {
        id: id.to_string(),
        name: name.to_string(),
        description: get_str(args, "description").unwrap_or_default().to_string(),
        risk_level: risk_level.to_string(),
        requires_reboot: get_bool(args, "requires_reboot", false),
        sysctl,
        qdisc,
        systemd,
    })
}

fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn get_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn get_usize(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn get_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn to_value(value: impl serde::Serialize) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn fmt_err(e: anyhow::Error) -> String {
    let message = e.to_string();
    if message.contains("connection refused")
        || message.contains("dns error")
        || message.contains("timed out")
    {
        return format!(
            "cannot connect to nettune server; verify it is running and the URL is correct ({message})"
        );
    }
    message
}

fn hint_not_found(e: anyhow::Error, hint: &str) -> String {
    let message = e.to_string();
    if message.contains("NOT_FOUND") {
        hint.to_string()
    } else {
        fmt_err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_tools_are_defined() {
        let defs = NettuneTools::definitions();
        assert_eq!(defs.len(), 10);
        let names: Vec<&str> = defs
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        for expected in [
            "nettune.test_rtt",
            "nettune.test_throughput",
            "nettune.test_latency_under_load",
            "nettune.snapshot_server",
            "nettune.list_profiles",
            "nettune.show_profile",
            "nettune.create_profile",
            "nettune.apply_profile",
            "nettune.rollback",
            "nettune.status",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn every_tool_has_a_schema() {
        for def in NettuneTools::definitions() {
            assert!(def["description"].as_str().unwrap().len() > 10);
            assert_eq!(def["inputSchema"]["type"], "object");
        }
    }

    #[test]
    fn profile_from_args_builds_full_profile() {
        let args = json!({
            "id": "my-tune",
            "name": "My tune",
            "risk_level": "low",
            "sysctl": {"net.core.rmem_max": 33554432},
            "qdisc_type": "fq",
            "qdisc_params": {"limit": 10000},
            "systemd_ensure_qdisc_service": true
        });
        let profile = profile_from_args(&args).unwrap();
        assert_eq!(profile.id, "my-tune");
        assert_eq!(profile.sysctl["net.core.rmem_max"].render(), "33554432");
        let qdisc = profile.qdisc.unwrap();
        assert_eq!(qdisc.kind, "fq");
        assert_eq!(qdisc.interfaces, "default-route");
        assert_eq!(qdisc.params["limit"].render(), "10000");
        assert!(profile.systemd.unwrap().ensure_qdisc_service);
    }

    #[test]
    fn profile_from_args_requires_identity_fields() {
        assert!(profile_from_args(&json!({"name": "x", "risk_level": "low"})).is_err());
        assert!(profile_from_args(&json!({"id": "ab", "risk_level": "low"})).is_err());
        assert!(profile_from_args(&json!({"id": "ab", "name": "x"})).is_err());
    }
}
