//! Per-IP token bucket rate limiting
//!
//! Buckets refill proportionally to elapsed time within the interval and
//! fully once an interval has passed. Probe endpoints hammer the server by
//! design, so the defaults are generous.

use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use nettune_core::ApiResponse;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Bucket {
    tokens: u32,
    last_reset: Instant,
}

/// Token bucket limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, Bucket>>>,
    rate: u32,
    burst: u32,
    interval: Duration,
}

impl RateLimiter {
    /// `burst` defaults to `rate` when zero.
    pub fn new(rate: u32, burst: u32, interval: Duration) -> Self {
        let burst = if burst == 0 { rate } else { burst };
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            rate,
            burst,
            interval,
        }
    }

    /// Whether a request from `key` may proceed right now.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = match self.inner.lock() {
            Ok(guard) => guard,
            // a poisoned limiter must not take the API down
            Err(poisoned) => poisoned.into_inner(),
        };

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_reset: now,
        });

        let elapsed = now.duration_since(bucket.last_reset);
        if elapsed >= self.interval {
            bucket.tokens = self.burst;
            bucket.last_reset = now;
        } else {
            let refill = (self.rate as u128 * elapsed.as_millis()
                / self.interval.as_millis().max(1)) as u32;
            if refill > 0 {
                bucket.tokens = bucket.tokens.saturating_add(refill).min(self.burst);
                bucket.last_reset = now;
            }
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Resolve the client key: X-Forwarded-For, then X-Real-IP, then the socket.
pub fn client_ip(headers: &HeaderMap, addr: Option<&SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Rate limiting middleware.
pub async fn limit(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let addr = connect_info.map(|ci| ci.0);
    let key = client_ip(request.headers(), addr.as_ref());

    if state.rate_limiter.allow(&key) {
        next.run(request).await
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiResponse::error("RATE_LIMITED", "too many requests")),
        )
            .into_response()
    }
}
