//! Systemd driver
//!
//! Installs and manages the boot-persistence unit that re-applies the root
//! qdisc after a reboot. The unit and its payload script are generated, not
//! templated from disk.

use crate::command;
use async_trait::async_trait;
use nettune_core::config::QDISC_SCRIPT_PATH;
use nettune_core::fsutil;
use nettune_core::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Operations on the managed systemd unit.
#[async_trait]
pub trait SystemdDriver: Send + Sync {
    /// Write a unit file under /etc/systemd/system and reload the daemon.
    async fn create_unit(&self, name: &str, content: &str) -> Result<()>;

    /// Install the boot script the managed unit executes, mode 0755.
    async fn install_qdisc_script(&self, script: &str) -> Result<()>;

    async fn enable(&self, name: &str) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn is_active(&self, name: &str) -> Result<bool>;

    async fn is_enabled(&self, name: &str) -> Result<bool>;
}

/// Driver backed by the real `systemctl` binary.
pub struct Systemctl;

impl Systemctl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemdDriver for Systemctl {
    async fn create_unit(&self, name: &str, content: &str) -> Result<()> {
        let path = format!("/etc/systemd/system/{name}");
        fsutil::atomic_write(Path::new(&path), content.as_bytes(), 0o644)?;
        command::run("systemctl", &["daemon-reload"]).await?;
        info!(unit = name, "installed systemd unit");
        Ok(())
    }

    async fn install_qdisc_script(&self, script: &str) -> Result<()> {
        fsutil::atomic_write(Path::new(QDISC_SCRIPT_PATH), script.as_bytes(), 0o755)?;
        Ok(())
    }

    async fn enable(&self, name: &str) -> Result<()> {
        command::run("systemctl", &["enable", name]).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        command::run("systemctl", &["start", name]).await?;
        Ok(())
    }

    async fn is_active(&self, name: &str) -> Result<bool> {
        // is-active exits non-zero for inactive units; that is an answer,
        // not an error.
        Ok(command::run_ignore_failure("systemctl", &["is-active", "--quiet", name]).await)
    }

    async fn is_enabled(&self, name: &str) -> Result<bool> {
        Ok(command::run_ignore_failure("systemctl", &["is-enabled", "--quiet", name]).await)
    }
}

/// Generate the boot script that restores the root qdisc. One `tc qdisc
/// replace` line per interface recorded at apply time.
pub fn generate_qdisc_script(kind: &str, interfaces: &[String], params: &BTreeMap<String, String>) -> String {
    let mut rendered_params = String::new();
    for (key, value) in params {
        rendered_params.push(' ');
        rendered_params.push_str(key);
        if !value.is_empty() {
            rendered_params.push(' ');
            rendered_params.push_str(value);
        }
    }

    let mut script = String::from("#!/bin/sh\n# Managed by nettune. Re-applies the root qdisc at boot.\nset -e\n");
    for iface in interfaces {
        script.push_str(&format!(
            "tc qdisc replace dev {iface} root {kind}{rendered_params}\n"
        ));
    }
    script
}

/// Generate the unit file pointing at [`QDISC_SCRIPT_PATH`].
pub fn generate_qdisc_unit() -> String {
    format!(
        "[Unit]\n\
         Description=nettune qdisc persistence\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         ExecStart={QDISC_SCRIPT_PATH}\n\
         RemainAfterExit=yes\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_lists_every_interface() {
        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), "10000".to_string());
        let script = generate_qdisc_script(
            "fq",
            &["eth0".to_string(), "eth1".to_string()],
            &params,
        );
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("tc qdisc replace dev eth0 root fq limit 10000\n"));
        assert!(script.contains("tc qdisc replace dev eth1 root fq limit 10000\n"));
    }

    #[test]
    fn script_flag_params_render_bare() {
        let mut params = BTreeMap::new();
        params.insert("nopacing".to_string(), String::new());
        let script = generate_qdisc_script("fq", &["eth0".to_string()], &params);
        assert!(script.contains("root fq nopacing\n"));
    }

    #[test]
    fn unit_points_at_managed_script() {
        let unit = generate_qdisc_unit();
        assert!(unit.contains(&format!("ExecStart={QDISC_SCRIPT_PATH}")));
        assert!(unit.contains("WantedBy=multi-user.target"));
        assert!(unit.contains("Type=oneshot"));
    }
}
