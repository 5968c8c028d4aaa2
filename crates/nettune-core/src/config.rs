//! Server and client configuration
//!
//! The CLI populates these from flags; defaults match the shipped systemd
//! unit. All persisted state lives under `state_dir`.

use std::path::{Path, PathBuf};

/// Managed sysctl persistence file. Owned exclusively by the apply engine.
pub const MANAGED_SYSCTL_FILE: &str = "/etc/sysctl.d/99-nettune.conf";

/// Managed systemd unit that re-applies the root qdisc at boot.
pub const QDISC_SERVICE_NAME: &str = "nettune-qdisc.service";

/// Unit file path for [`QDISC_SERVICE_NAME`].
pub const QDISC_SERVICE_PATH: &str = "/etc/systemd/system/nettune-qdisc.service";

/// Generated shell script the managed unit executes.
pub const QDISC_SCRIPT_PATH: &str = "/usr/local/lib/nettune/qdisc-setup.sh";

/// Server-side configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, host:port.
    pub listen: String,
    /// Bearer token required on every non-/health route.
    pub api_key: String,
    /// Root of persisted state (profiles, snapshots, history).
    pub state_dir: PathBuf,
    /// HTTP read timeout, seconds.
    pub read_timeout: u64,
    /// HTTP write timeout, seconds.
    pub write_timeout: u64,
    /// Request body cap in bytes. Large enough for upload probes.
    pub max_body_bytes: usize,
    /// Rate limit: requests per interval.
    pub rate_limit: u32,
    /// Rate limit burst size.
    pub rate_burst: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9876".to_string(),
            api_key: String::new(),
            state_dir: PathBuf::from("/var/lib/nettune"),
            read_timeout: 30,
            write_timeout: 60,
            max_body_bytes: 256 * 1024 * 1024,
            rate_limit: 100_000,
            rate_burst: 20_000,
        }
    }
}

impl ServerConfig {
    pub fn profiles_dir(&self) -> PathBuf {
        self.state_dir.join("profiles")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_dir.join("snapshots")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.state_dir.join("history")
    }
}

/// Client-side configuration for the MCP frontend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the nettune server.
    pub server: String,
    pub api_key: String,
    /// Request timeout, seconds. Throughput probes need generous values.
    pub timeout: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:9876".to_string(),
            api_key: String::new(),
            timeout: 60,
        }
    }
}

/// Files a profile apply may overwrite, and therefore every snapshot must
/// back up.
pub fn managed_paths() -> Vec<&'static Path> {
    vec![
        Path::new(MANAGED_SYSCTL_FILE),
        Path::new(QDISC_SERVICE_PATH),
        Path::new(QDISC_SCRIPT_PATH),
    ]
}
