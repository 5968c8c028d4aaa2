//! Throughput probe
//!
//! Timed bulk transfers across parallel connections. Multi-iteration runs
//! report the per-iteration spread so the operator can judge stability.

use crate::http::Client;
use crate::probe::stats;
use anyhow::Result;
use futures::future::join_all;
use nettune_core::ThroughputResult;
use std::time::{Duration, Instant};

const DEFAULT_BYTES: u64 = 100 * 1024 * 1024;

pub struct ThroughputTester {
    client: Client,
}

impl ThroughputTester {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn test_download(
        &self,
        bytes: u64,
        parallel: usize,
        iterations: usize,
    ) -> Result<ThroughputResult> {
        self.run("download", bytes, parallel, iterations).await
    }

    pub async fn test_upload(
        &self,
        bytes: u64,
        parallel: usize,
        iterations: usize,
    ) -> Result<ThroughputResult> {
        self.run("upload", bytes, parallel, iterations).await
    }

    async fn run(
        &self,
        direction: &str,
        bytes: u64,
        parallel: usize,
        iterations: usize,
    ) -> Result<ThroughputResult> {
        let bytes = if bytes == 0 { DEFAULT_BYTES } else { bytes };
        let parallel = parallel.max(1);
        let iterations = iterations.max(1);
        let per_connection = bytes / parallel as u64;

        // Upload payload generated once, reused across iterations.
        let payload = if direction == "upload" {
            Some(make_payload(per_connection as usize))
        } else {
            None
        };

        let mut all_results = Vec::with_capacity(iterations);
        let mut total_bytes: u64 = 0;
        let mut total_duration = Duration::ZERO;
        let mut errors = Vec::new();

        for _ in 0..iterations {
            let start = Instant::now();
            let mut tasks = Vec::with_capacity(parallel);
            for _ in 0..parallel {
                let client = self.client.clone();
                let payload = payload.clone();
                tasks.push(tokio::spawn(async move {
                    match payload {
                        Some(data) => client
                            .probe_upload(data)
                            .await
                            .map(|resp| resp.received_bytes),
                        None => client
                            .probe_download(per_connection)
                            .await
                            .map(|(received, _)| received),
                    }
                }));
            }

            let mut iter_bytes: u64 = 0;
            for outcome in join_all(tasks).await {
                match outcome {
                    Ok(Ok(transferred)) => iter_bytes += transferred,
                    Ok(Err(e)) => errors.push(e.to_string()),
                    Err(e) => errors.push(format!("transfer task failed: {e}")),
                }
            }
            let iter_duration = start.elapsed();

            total_bytes += iter_bytes;
            total_duration += iter_duration;
            all_results.push(throughput_mbps(iter_bytes, iter_duration));
        }

        let avg = stats::mean(&all_results);
        let std_dev = stats::std_deviation(&all_results, avg);

        let mut result = ThroughputResult {
            direction: direction.to_string(),
            bytes: total_bytes,
            duration_ms: total_duration.as_millis() as u64,
            throughput_mbps: avg,
            parallel,
            iterations: None,
            all_results: Vec::new(),
            std_dev: None,
            errors,
        };
        if iterations > 1 {
            result.iterations = Some(iterations);
            result.all_results = all_results;
            result.std_dev = Some(std_dev);
        }
        Ok(result)
    }
}

/// Megabits per second for a transfer of `bytes` over `duration`.
pub fn throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    let ms = duration.as_millis();
    if ms == 0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / ms as f64 / 1000.0
}

/// Incompressible-ish payload so upload numbers are honest across
/// compressing middleboxes.
fn make_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state: u64 = 0x9e3779b97f4a7c15;
    for byte in data.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *byte = state as u8;
    }
    data
}
