//! Probe result types shared between the server surface and the client
//! testers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latency distribution, all values in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

/// RTT test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RttResult {
    pub count: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt: Option<LatencyStats>,
    /// Mean absolute difference between successive samples, milliseconds.
    pub jitter: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Throughput test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputResult {
    /// "download" or "upload".
    pub direction: String,
    pub bytes: u64,
    pub duration_ms: u64,
    pub throughput_mbps: f64,
    pub parallel: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    /// Per-iteration throughput in Mbps when iterations > 1.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_results: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Bufferbloat probe: latency with and without saturating load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyUnderLoadResult {
    pub baseline: LatencyStats,
    pub under_load: LatencyStats,
    pub inflation_p50: f64,
    pub inflation_p99: f64,
    pub load_duration_ms: u64,
    pub load_mbps: f64,
}

/// GET /probe/echo response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub ts: i64,
    pub ok: bool,
}

/// POST /probe/upload response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub received_bytes: u64,
    pub duration_ms: u64,
}

/// GET /probe/info response: static facts an operator needs before tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub hostname: String,
    pub kernel_version: String,
    pub distribution: String,
    pub congestion_control: String,
    pub default_qdisc: String,
    pub default_interface: String,
    pub interface_mtu: u32,
    #[serde(default)]
    pub available_ccs: Vec<String>,
    /// External tool name -> availability status.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}
