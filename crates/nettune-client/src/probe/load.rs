//! Latency-under-load probe (bufferbloat detector)
//!
//! Samples baseline RTT, then keeps echo probes running while parallel
//! downloads saturate the link. Inflation of p50/p99 under load is the
//! bufferbloat signal that motivates an fq_codel or cake profile.

use crate::http::Client;
use crate::probe::stats;
use crate::probe::throughput::throughput_mbps;
use anyhow::Result;
use futures::future::join_all;
use nettune_core::LatencyUnderLoadResult;
use std::time::{Duration, Instant};
use tracing::debug;

const BASELINE_SAMPLES: usize = 10;
const LOAD_CHUNK_BYTES: u64 = 8 * 1024 * 1024;

pub struct LatencyLoadTester {
    client: Client,
}

impl LatencyLoadTester {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// `duration_secs` of load from `load_parallel` connections, echoing
    /// every `echo_interval_ms` throughout.
    pub async fn test(
        &self,
        duration_secs: u64,
        load_parallel: usize,
        echo_interval_ms: u64,
    ) -> Result<LatencyUnderLoadResult> {
        let duration_secs = if duration_secs == 0 { 10 } else { duration_secs };
        let load_parallel = load_parallel.max(1);
        let echo_interval_ms = if echo_interval_ms == 0 { 100 } else { echo_interval_ms };

        let baseline_samples = self.sample_rtt(BASELINE_SAMPLES).await;
        let baseline = stats::latency_stats(&baseline_samples).unwrap_or_default();
        debug!(p50 = baseline.p50, "baseline RTT sampled");

        let deadline = Instant::now() + Duration::from_secs(duration_secs);

        // Load generators: back-to-back downloads until the deadline.
        let mut load_tasks = Vec::with_capacity(load_parallel);
        for _ in 0..load_parallel {
            let client = self.client.clone();
            load_tasks.push(tokio::spawn(async move {
                let mut transferred: u64 = 0;
                while Instant::now() < deadline {
                    match client.probe_download(LOAD_CHUNK_BYTES).await {
                        Ok((received, _)) => transferred += received,
                        Err(_) => break,
                    }
                }
                transferred
            }));
        }

        // Echo sampler runs alongside the load.
        let sampler = {
            let client = self.client.clone();
            tokio::spawn(async move {
                let mut samples = Vec::new();
                let mut ticker = tokio::time::interval(Duration::from_millis(echo_interval_ms));
                while Instant::now() < deadline {
                    ticker.tick().await;
                    let start = Instant::now();
                    if client.probe_echo().await.is_ok() {
                        samples.push(start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                samples
            })
        };

        let load_started = Instant::now();
        let transferred: u64 = join_all(load_tasks)
            .await
            .into_iter()
            .map(|outcome| outcome.unwrap_or(0))
            .sum();
        let load_duration = load_started.elapsed();
        let loaded_samples = sampler.await.unwrap_or_default();

        let under_load = stats::latency_stats(&loaded_samples).unwrap_or_default();

        Ok(LatencyUnderLoadResult {
            inflation_p50: inflation(baseline.p50, under_load.p50),
            inflation_p99: inflation(baseline.p99, under_load.p99),
            baseline,
            under_load,
            load_duration_ms: load_duration.as_millis() as u64,
            load_mbps: throughput_mbps(transferred, load_duration),
        })
    }

    async fn sample_rtt(&self, count: usize) -> Vec<f64> {
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let start = Instant::now();
            if self.client.probe_echo().await.is_ok() {
                samples.push(start.elapsed().as_secs_f64() * 1000.0);
            }
        }
        samples
    }
}

fn inflation(baseline: f64, loaded: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    loaded / baseline
}
