// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-bucket rate limiting per principal and per channel.
//!
//! Buckets refill lazily on query. Admission never blocks: denial carries
//! the time after which a retry would succeed. Buckets idle for over an
//! hour are evicted opportunistically during admission.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Idle age after which a bucket may be dropped.
const EVICT_IDLE: Duration = Duration::from_secs(3600);

/// Minimum interval between opportunistic eviction sweeps.
const EVICT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of an admission query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmitDecision {
    pub allowed: bool,
    /// Seconds until a retry would be admitted. Zero when allowed.
    pub retry_after_s: f64,
}

impl AdmitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_s: 0.0,
        }
    }

    fn deny(retry_after_s: f64) -> Self {
        Self {
            allowed: false,
            retry_after_s,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Thread-safe token-bucket rate limiter keyed by an opaque principal id.
///
/// Channel admission uses an independent bucket space via
/// [`admit_channel`](RateLimiter::admit_channel).
pub struct RateLimiter {
    rps: f64,
    burst: u32,
    buckets: DashMap<String, Bucket>,
    last_sweep: std::sync::Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            rps,
            burst,
            buckets: DashMap::new(),
            last_sweep: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Admits a request from a control-plane principal.
    pub fn admit(&self, principal_id: &str, cost: f64) -> AdmitDecision {
        self.admit_key(&format!("principal:{principal_id}"), cost)
    }

    /// Admits an inbound message on a channel. Channel buckets are
    /// independent of principal buckets.
    pub fn admit_channel(&self, channel_id: &str) -> AdmitDecision {
        self.admit_key(&format!("channel:{channel_id}"), 1.0)
    }

    fn admit_key(&self, key: &str, cost: f64) -> AdmitDecision {
        self.maybe_evict();

        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: f64::from(self.burst),
            last: now,
        });

        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.last = now;
        bucket.tokens = (bucket.tokens + elapsed * self.rps).min(f64::from(self.burst));

        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            AdmitDecision::allow()
        } else {
            let retry_after = (cost - bucket.tokens) / self.rps;
            metrics::counter!("agw_rate_limit_denials_total").increment(1);
            AdmitDecision::deny(retry_after)
        }
    }

    /// Drops buckets that have not been queried for [`EVICT_IDLE`].
    pub fn evict_idle(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last) < EVICT_IDLE);
    }

    fn maybe_evict(&self) {
        let mut last = self.last_sweep.lock().expect("sweep lock poisoned");
        if last.elapsed() >= EVICT_SWEEP_INTERVAL {
            *last = Instant::now();
            drop(last);
            self.evict_idle();
        }
    }

    /// Number of live buckets (diagnostics).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
