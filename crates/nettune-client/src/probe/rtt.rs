//! RTT probe
//!
//! Fires echo requests (optionally concurrent) and reports the latency
//! distribution plus jitter and failure count.

use crate::http::Client;
use crate::probe::stats;
use anyhow::Result;
use futures::future::join_all;
use nettune_core::RttResult;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

pub struct RttTester {
    client: Client,
}

impl RttTester {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Run `count` echo round trips with at most `concurrency` in flight.
    pub async fn test(&self, count: usize, concurrency: usize) -> Result<RttResult> {
        let count = if count == 0 { 30 } else { count };
        let concurrency = if concurrency == 0 { 1 } else { concurrency };

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = Vec::with_capacity(count);
        for _ in 0..count {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let start = Instant::now();
                match client.probe_echo().await {
                    Ok(()) => Ok(start.elapsed().as_secs_f64() * 1000.0),
                    Err(e) => Err(e.to_string()),
                }
            }));
        }

        let mut rtts = Vec::new();
        let mut errors = Vec::new();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(Ok(ms)) => rtts.push(ms),
                Ok(Err(message)) => errors.push(message),
                Err(e) => errors.push(format!("probe task failed: {e}")),
            }
        }

        Ok(RttResult {
            count,
            successful: rtts.len(),
            failed: errors.len(),
            rtt: stats::latency_stats(&rtts),
            jitter: stats::jitter(&rtts),
            errors,
        })
    }
}
