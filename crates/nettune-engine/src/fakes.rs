//! In-memory driver fakes for engine tests.

#![cfg(test)]

use async_trait::async_trait;
use nettune_adapter::{QdiscDriver, SysctlDriver, SystemAdapter, SystemdDriver};
use nettune_core::{NettuneError, QdiscInfo, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Fake kernel parameter table plus a fake filesystem for sysctl.d files.
#[derive(Default)]
pub struct FakeSysctl {
    pub values: Mutex<BTreeMap<String, String>>,
    pub files: Mutex<BTreeMap<PathBuf, BTreeMap<String, String>>>,
    /// Keys the kernel silently rejects: the write "succeeds" but the value
    /// never changes. Models scenario 5 of the verification tests.
    pub silently_rejected: Mutex<BTreeSet<String>>,
    /// Force set_many to fail outright.
    pub fail_writes: Mutex<bool>,
    /// Artificial delay inside set_many, for exclusion tests.
    pub write_delay: Mutex<Option<Duration>>,
}

impl FakeSysctl {
    pub async fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    pub async fn get_value(&self, key: &str) -> Option<String> {
        self.values.lock().await.get(key).cloned()
    }

    pub async fn written_file(&self, path: &Path) -> Option<BTreeMap<String, String>> {
        self.files.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl SysctlDriver for FakeSysctl {
    async fn get(&self, key: &str) -> Result<String> {
        self.values
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| NettuneError::adapter(format!("unknown key {key}")))
    }

    async fn set_many(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(delay) = *self.write_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_writes.lock().await {
            return Err(NettuneError::adapter("sysctl write refused"));
        }
        let rejected = self.silently_rejected.lock().await;
        let mut table = self.values.lock().await;
        for (key, value) in values {
            if !rejected.contains(key) {
                table.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
        self.files
            .lock()
            .await
            .insert(path.to_path_buf(), values.clone());
        Ok(())
    }

    async fn load_from_file(&self, path: &Path) -> Result<()> {
        let values = self
            .files
            .lock()
            .await
            .get(path)
            .cloned()
            .unwrap_or_default();
        self.set_many(&values).await
    }
}

/// Fake interface table with per-interface root qdiscs.
#[derive(Default)]
pub struct FakeQdisc {
    pub qdiscs: Mutex<BTreeMap<String, QdiscInfo>>,
    pub default_iface: Mutex<String>,
}

impl FakeQdisc {
    pub async fn set_current(&self, iface: &str, info: QdiscInfo) {
        self.qdiscs.lock().await.insert(iface.to_string(), info);
        let mut default_iface = self.default_iface.lock().await;
        if default_iface.is_empty() {
            *default_iface = iface.to_string();
        }
    }

    pub async fn kind_of(&self, iface: &str) -> Option<String> {
        self.qdiscs.lock().await.get(iface).map(|q| q.kind.clone())
    }
}

#[async_trait]
impl QdiscDriver for FakeQdisc {
    async fn get(&self, iface: &str) -> Result<QdiscInfo> {
        self.qdiscs
            .lock()
            .await
            .get(iface)
            .cloned()
            .ok_or_else(|| NettuneError::adapter(format!("no qdisc for {iface}")))
    }

    async fn set(&self, iface: &str, kind: &str, params: &BTreeMap<String, String>) -> Result<()> {
        self.qdiscs.lock().await.insert(
            iface.to_string(),
            QdiscInfo {
                kind: kind.to_string(),
                handle: "8001".to_string(),
                params: params.clone(),
            },
        );
        Ok(())
    }

    async fn list_interfaces(&self) -> Result<Vec<String>> {
        Ok(self.qdiscs.lock().await.keys().cloned().collect())
    }

    async fn default_route_interface(&self) -> Result<String> {
        let iface = self.default_iface.lock().await.clone();
        if iface.is_empty() {
            return Err(NettuneError::adapter("no default route found"));
        }
        Ok(iface)
    }
}

/// Fake systemd unit table.
#[derive(Default)]
pub struct FakeSystemd {
    pub units: Mutex<BTreeMap<String, String>>,
    pub script: Mutex<Option<String>>,
    pub active: Mutex<BTreeSet<String>>,
    pub enabled: Mutex<BTreeSet<String>>,
    /// Force enable to fail, modelling a host where the unit cannot be
    /// installed (systemd unavailable, read-only /etc).
    pub fail_enable: Mutex<bool>,
}

#[async_trait]
impl SystemdDriver for FakeSystemd {
    async fn create_unit(&self, name: &str, content: &str) -> Result<()> {
        self.units
            .lock()
            .await
            .insert(name.to_string(), content.to_string());
        Ok(())
    }

    async fn install_qdisc_script(&self, script: &str) -> Result<()> {
        *self.script.lock().await = Some(script.to_string());
        Ok(())
    }

    async fn enable(&self, name: &str) -> Result<()> {
        if *self.fail_enable.lock().await {
            return Err(NettuneError::adapter("systemctl enable refused"));
        }
        self.enabled.lock().await.insert(name.to_string());
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.active.lock().await.insert(name.to_string());
        Ok(())
    }

    async fn is_active(&self, name: &str) -> Result<bool> {
        Ok(self.active.lock().await.contains(name))
    }

    async fn is_enabled(&self, name: &str) -> Result<bool> {
        Ok(self.enabled.lock().await.contains(name))
    }
}

/// Build a [`SystemAdapter`] over fresh fakes, returning the fakes for
/// inspection.
pub fn fake_adapter() -> (
    SystemAdapter,
    Arc<FakeSysctl>,
    Arc<FakeQdisc>,
    Arc<FakeSystemd>,
) {
    let sysctl = Arc::new(FakeSysctl::default());
    let qdisc = Arc::new(FakeQdisc::default());
    let systemd = Arc::new(FakeSystemd::default());
    let adapter = SystemAdapter {
        sysctl: sysctl.clone(),
        qdisc: qdisc.clone(),
        systemd: systemd.clone(),
    };
    (adapter, sysctl, qdisc, systemd)
}
