//! Server facts for GET /probe/info
//!
//! Everything an operator wants to know before choosing a profile: kernel,
//! congestion control, default qdisc, the default-route interface and
//! whether the external tools the adapter shells out to are present.

use nettune_adapter::{command, SystemAdapter};
use nettune_core::ServerInfo;
use std::collections::BTreeMap;

const REQUIRED_TOOLS: &[&str] = &["tc", "sysctl", "systemctl", "ip"];

/// Gather server facts. Individual read failures degrade to empty fields;
/// this endpoint must never error because one /proc file is missing.
pub async fn collect(adapter: &SystemAdapter) -> ServerInfo {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();

    let kernel_version = read_trimmed("/proc/sys/kernel/osrelease").await;
    let congestion_control = read_trimmed("/proc/sys/net/ipv4/tcp_congestion_control").await;
    let default_qdisc = read_trimmed("/proc/sys/net/core/default_qdisc").await;
    let available_ccs = read_trimmed("/proc/sys/net/ipv4/tcp_available_congestion_control")
        .await
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let distribution = read_os_release().await;

    let default_interface = adapter
        .qdisc
        .default_route_interface()
        .await
        .unwrap_or_default();
    let interface_mtu = if default_interface.is_empty() {
        0
    } else {
        read_trimmed(&format!("/sys/class/net/{default_interface}/mtu"))
            .await
            .parse()
            .unwrap_or(0)
    };

    let mut dependencies = BTreeMap::new();
    for tool in REQUIRED_TOOLS {
        let status = if command::available(tool).await {
            "ok"
        } else {
            "missing"
        };
        dependencies.insert(tool.to_string(), status.to_string());
    }

    ServerInfo {
        hostname,
        kernel_version,
        distribution,
        congestion_control,
        default_qdisc,
        default_interface,
        interface_mtu,
        available_ccs,
        dependencies,
    }
}

async fn read_trimmed(path: &str) -> String {
    tokio::fs::read_to_string(path)
        .await
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

async fn read_os_release() -> String {
    let content = tokio::fs::read_to_string("/etc/os-release")
        .await
        .unwrap_or_default();
    parse_os_release(&content)
}

fn parse_os_release(content: &str) -> String {
    content
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|value| value.trim_matches('"').to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_name_is_unquoted() {
        let content = "NAME=\"Debian GNU/Linux\"\nPRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nID=debian\n";
        assert_eq!(parse_os_release(content), "Debian GNU/Linux 12 (bookworm)");
    }

    #[test]
    fn missing_pretty_name_is_empty() {
        assert_eq!(parse_os_release("ID=alpine\n"), "");
    }
}
