//! Sysctl driver
//!
//! Reads and writes kernel parameters through the `sysctl` binary and
//! persists them to a managed sysctl.d file.

use crate::command;
use async_trait::async_trait;
use nettune_core::fsutil;
use nettune_core::{NettuneError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Read/write access to kernel parameters.
#[async_trait]
pub trait SysctlDriver: Send + Sync {
    /// Current value of a single key, trimmed.
    async fn get(&self, key: &str) -> Result<String>;

    /// Apply a batch of key/value pairs to the running kernel. Stops at the
    /// first failure, reporting how many keys were already written.
    async fn set_many(&self, values: &BTreeMap<String, String>) -> Result<()>;

    /// Persist a key/value block to a sysctl.d file, atomically, mode 0644.
    async fn write_file(&self, path: &Path, values: &BTreeMap<String, String>) -> Result<()>;

    /// Re-apply every value found in a persisted sysctl.d file.
    async fn load_from_file(&self, path: &Path) -> Result<()>;
}

/// Driver backed by the real `sysctl` binary.
pub struct ProcSysctl;

impl ProcSysctl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcSysctl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SysctlDriver for ProcSysctl {
    async fn get(&self, key: &str) -> Result<String> {
        command::run("sysctl", &["-n", key]).await
    }

    async fn set_many(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let mut written = 0usize;
        for (key, value) in values {
            let assignment = format!("{key}={value}");
            if let Err(e) = command::run("sysctl", &["-w", &assignment]).await {
                return Err(NettuneError::adapter(format!(
                    "failed to set {key} ({written}/{} keys applied): {e}",
                    values.len()
                )));
            }
            debug!(key = %key, value = %value, "set sysctl");
            written += 1;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
        let rendered = render_sysctl_file(values);
        fsutil::atomic_write(path, rendered.as_bytes(), 0o644)?;
        info!(path = %path.display(), keys = values.len(), "wrote sysctl file");
        Ok(())
    }

    async fn load_from_file(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let values = parse_sysctl_file(&content);
        self.set_many(&values).await
    }
}

/// Render a `key = value` block. Keys iterate in sorted order so the file is
/// reproducible.
pub fn render_sysctl_file(values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(values.len() * 32);
    for (key, value) in values {
        out.push_str(key);
        out.push_str(" = ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Parse a sysctl.d style file back into key/value pairs. Comments and
/// malformed lines are skipped.
pub fn parse_sysctl_file(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                values.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    values
}
