//! Qdisc driver
//!
//! Root qdisc inspection and replacement through `tc`, interface
//! enumeration through /sys/class/net, default-route resolution through
//! /proc/net/route with an `ip route` fallback.

use crate::command;
use async_trait::async_trait;
use nettune_core::{NettuneError, QdiscInfo, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Valid parameter names per qdisc type. Anything outside these closed sets
/// is rejected before `tc` ever runs.
pub const VALID_QDISC_PARAMS: &[(&str, &[&str])] = &[
    (
        "fq",
        &[
            "limit", "flow_limit", "quantum", "initial_quantum", "maxrate", "buckets", "pacing",
            "nopacing", "refill_delay", "low_rate_threshold", "orphan_mask", "timer_slack",
            "ce_threshold", "horizon", "horizon_cap", "horizon_drop",
        ],
    ),
    (
        "fq_codel",
        &[
            "limit", "flows", "target", "interval", "quantum", "ecn", "noecn", "ce_threshold",
            "memory_limit",
        ],
    ),
    (
        "cake",
        &[
            "bandwidth", "besteffort", "diffserv3", "diffserv4", "diffserv8", "flowblind",
            "srchost", "dsthost", "hosts", "flows", "dual-srchost", "dual-dsthost", "nat", "nonat",
            "wash", "nowash", "split-gso", "no-split-gso", "ack-filter", "ack-filter-aggressive",
            "no-ack-filter", "memlimit", "fwmark", "atm", "noatm", "ptm", "noptm", "overhead",
            "mpu", "ingress", "egress", "rtt", "raw", "conservative",
        ],
    ),
    ("pfifo_fast", &[]),
];

/// Root qdisc operations on network interfaces.
#[async_trait]
pub trait QdiscDriver: Send + Sync {
    /// Root qdisc of one interface.
    async fn get(&self, iface: &str) -> Result<QdiscInfo>;

    /// Set the root qdisc: replace, falling back to delete+add.
    async fn set(&self, iface: &str, kind: &str, params: &BTreeMap<String, String>) -> Result<()>;

    /// All interfaces that are up, excluding loopback.
    async fn list_interfaces(&self) -> Result<Vec<String>>;

    /// Interface carrying the default route.
    async fn default_route_interface(&self) -> Result<String>;

    /// Root qdisc of every listed interface; unreadable interfaces are
    /// skipped.
    async fn get_all(&self) -> Result<BTreeMap<String, QdiscInfo>> {
        let mut result = BTreeMap::new();
        for iface in self.list_interfaces().await? {
            match self.get(&iface).await {
                Ok(info) => {
                    result.insert(iface, info);
                }
                Err(e) => {
                    debug!(iface, error = %e, "failed to read qdisc");
                }
            }
        }
        Ok(result)
    }
}

/// Driver backed by the real `tc` binary.
pub struct Tc;

impl Tc {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Tc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QdiscDriver for Tc {
    async fn get(&self, iface: &str) -> Result<QdiscInfo> {
        let output = command::run("tc", &["qdisc", "show", "dev", iface]).await?;
        let lines: Vec<&str> = output.lines().collect();
        if lines.is_empty() {
            return Err(NettuneError::adapter(format!("no qdisc output for {iface}")));
        }

        // Prefer the root qdisc line; fall back to the first line.
        let line = lines
            .iter()
            .find(|l| l.contains("root"))
            .unwrap_or(&lines[0]);
        parse_qdisc_line(line)
    }

    async fn set(&self, iface: &str, kind: &str, params: &BTreeMap<String, String>) -> Result<()> {
        let mut args = vec!["qdisc", "replace", "dev", iface, "root", kind];
        for (key, value) in params {
            args.push(key);
            if !value.is_empty() {
                args.push(value);
            }
        }

        if let Err(replace_err) = command::run("tc", &args).await {
            debug!(iface, error = %replace_err, "qdisc replace failed, trying delete+add");

            // There might not be a root qdisc to delete.
            command::run_ignore_failure("tc", &["qdisc", "del", "dev", iface, "root"]).await;

            let mut add_args = vec!["qdisc", "add", "dev", iface, "root", kind];
            for (key, value) in params {
                add_args.push(key);
                if !value.is_empty() {
                    add_args.push(value);
                }
            }
            command::run("tc", &add_args).await.map_err(|e| {
                NettuneError::adapter(format!("failed to set qdisc for {iface}: {e}"))
            })?;
        }

        info!(iface, kind, "set root qdisc");
        Ok(())
    }

    async fn list_interfaces(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir("/sys/class/net").await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                continue;
            }
            let operstate =
                tokio::fs::read_to_string(format!("/sys/class/net/{name}/operstate"))
                    .await
                    .unwrap_or_default();
            // "unknown" covers virtual interfaces that are administratively up
            let operstate = operstate.trim();
            if operstate == "up" || operstate == "unknown" {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn default_route_interface(&self) -> Result<String> {
        match tokio::fs::read_to_string("/proc/net/route").await {
            Ok(content) => {
                if let Some(iface) = parse_proc_route(&content) {
                    return Ok(iface);
                }
                Err(NettuneError::adapter("no default route found"))
            }
            Err(_) => {
                // Container environments may hide /proc/net/route.
                let output = command::run("ip", &["route", "show", "default"]).await?;
                parse_ip_route_default(&output)
                    .ok_or_else(|| NettuneError::adapter("no default route interface found"))
            }
        }
    }
}

/// Parse one `tc qdisc show` line, e.g.
/// `qdisc fq 8001: root refcnt 2 limit 10000p flow_limit 100p buckets 1024`.
pub fn parse_qdisc_line(line: &str) -> Result<QdiscInfo> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 || fields[0] != "qdisc" {
        return Err(NettuneError::adapter(format!("invalid qdisc line: {line}")));
    }

    let mut params = BTreeMap::new();
    let mut i = 3;
    while i < fields.len() {
        let key = fields[i];
        if key == "root" || key == "refcnt" {
            // refcnt consumes its count operand
            if key == "refcnt" {
                i += 1;
            }
            i += 1;
            continue;
        }
        if i + 1 < fields.len() {
            params.insert(key.to_string(), fields[i + 1].to_string());
        }
        i += 2;
    }

    Ok(QdiscInfo {
        kind: fields[1].to_string(),
        handle: fields[2].trim_end_matches(':').to_string(),
        params,
    })
}

/// Default route in /proc/net/route has destination 00000000; field 0 is the
/// interface name, field 1 the destination.
fn parse_proc_route(content: &str) -> Option<String> {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[1] == "00000000" {
            return Some(fields[0].to_string());
        }
    }
    None
}

/// Parse `ip route show default`: "default via 192.168.1.1 dev eth0 ...".
fn parse_ip_route_default(output: &str) -> Option<String> {
    let fields: Vec<&str> = output.split_whitespace().collect();
    fields
        .iter()
        .position(|f| *f == "dev")
        .and_then(|i| fields.get(i + 1))
        .map(|s| s.to_string())
}

/// Enforce the closed parameter allow-list for a qdisc type. Reports every
/// offending name together with the valid set.
pub fn validate_params(kind: &str, params: &BTreeMap<String, String>) -> Result<()> {
    let valid = VALID_QDISC_PARAMS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, v)| *v)
        .ok_or_else(|| NettuneError::validation(format!("unknown qdisc type: {kind}")))?;

    let invalid: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|key| !valid.contains(key))
        .collect();

    if !invalid.is_empty() {
        return Err(NettuneError::validation(format!(
            "invalid parameter(s) for qdisc '{kind}': {invalid:?}; valid parameters: {valid:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fq_root_line() {
        let info = parse_qdisc_line(
            "qdisc fq 8001: root refcnt 2 limit 10000p flow_limit 100p buckets 1024",
        )
        .unwrap();
        assert_eq!(info.kind, "fq");
        assert_eq!(info.handle, "8001");
        assert_eq!(info.params["limit"], "10000p");
        assert_eq!(info.params["flow_limit"], "100p");
        assert_eq!(info.params["buckets"], "1024");
        assert!(!info.params.contains_key("root"));
        assert!(!info.params.contains_key("refcnt"));
    }

    #[test]
    fn parses_pfifo_fast_line() {
        let info = parse_qdisc_line(
            "qdisc pfifo_fast 0: root refcnt 2 bands 3 priomap 1 2 2 2",
        )
        .unwrap();
        assert_eq!(info.kind, "pfifo_fast");
        assert_eq!(info.handle, "0");
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(parse_qdisc_line("").is_err());
        assert!(parse_qdisc_line("class htb 1:1").is_err());
        assert!(parse_qdisc_line("qdisc fq").is_err());
    }

    #[test]
    fn proc_route_finds_default() {
        let content = "Iface\tDestination\tGateway\tFlags\n\
                       eth0\t000AFEA9\t00000000\t0001\n\
                       eth0\t00000000\t010AFEA9\t0003\n";
        assert_eq!(parse_proc_route(content).as_deref(), Some("eth0"));
    }

    #[test]
    fn proc_route_without_default_is_none() {
        let content = "Iface\tDestination\tGateway\tFlags\neth0\t000AFEA9\t00000000\t0001\n";
        assert_eq!(parse_proc_route(content), None);
    }

    #[test]
    fn ip_route_fallback_extracts_dev() {
        let out = "default via 192.168.1.1 dev eth0 proto dhcp metric 100";
        assert_eq!(parse_ip_route_default(out).as_deref(), Some("eth0"));
        assert_eq!(parse_ip_route_default("garbage"), None);
    }

    #[test]
    fn validate_accepts_fq_params() {
        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), "10000".to_string());
        params.insert("maxrate".to_string(), "1gbit".to_string());
        assert!(validate_params("fq", &params).is_ok());
    }

    #[test]
    fn validate_rejects_cake_param_on_fq() {
        // bandwidth belongs to cake, not fq
        let mut params = BTreeMap::new();
        params.insert("bandwidth".to_string(), "1gbit".to_string());
        let err = validate_params("fq", &params).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bandwidth"));
        assert!(message.contains("fq"));
        assert!(message.contains("limit"), "message should list the valid set");
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let err = validate_params("htb", &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown qdisc type"));
    }

    #[test]
    fn pfifo_fast_takes_no_params() {
        assert!(validate_params("pfifo_fast", &BTreeMap::new()).is_ok());
        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), "1000".to_string());
        assert!(validate_params("pfifo_fast", &params).is_err());
    }
}
