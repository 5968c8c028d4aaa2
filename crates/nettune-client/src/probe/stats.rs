//! Shared statistics helpers for the probes.

use nettune_core::LatencyStats;

/// Average of a sample; zero for an empty one.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation around a known mean.
pub fn std_deviation(values: &[f64], avg: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_squares: f64 = values.iter().map(|v| (v - avg) * (v - avg)).sum();
    (sum_squares / (values.len() - 1) as f64).sqrt()
}

/// Nearest-rank percentile over a sorted sample.
pub fn percentile(sorted: &[f64], p: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() - 1) * p / 100;
    sorted[idx]
}

/// Full latency distribution of a sample. Empty samples yield `None`.
pub fn latency_stats(values: &[f64]) -> Option<LatencyStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some(LatencyStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: mean(&sorted),
        p50: percentile(&sorted, 50),
        p90: percentile(&sorted, 90),
        p99: percentile(&sorted, 99),
    })
}

/// Jitter as mean absolute deviation from the mean.
pub fn jitter(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).abs()).sum::<f64>() / values.len() as f64
}
