//! Fixed-window admission control for the expensive endpoints.
//!
//! [`AdmissionController`] keeps one [`RateBucket`] per `(identity,
//! endpoint)` pair. Each request bumps its bucket; once the count passes the
//! limit inside the current window the request is refused until the window
//! rolls over or an admin resets the identity. The decision never blocks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use cr_domain::config::AdmissionConfig;
use cr_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Endpoints that are budgeted. Status and close are cheap and never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Handshake,
    Execute,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Handshake => "handshake",
            Endpoint::Execute => "execute",
        }
    }
}

struct RateBucket {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Refused { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub identity: String,
    pub endpoint: Endpoint,
    pub count: u32,
    pub remaining: u32,
    pub limited: bool,
    pub resets_in_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStats {
    pub limit: u32,
    pub window_secs: u64,
    pub buckets: usize,
    pub identities: usize,
    pub limited: usize,
    pub entries: Vec<BucketStatus>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AdmissionController
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AdmissionController {
    limit: u32,
    window: Duration,
    retention: Duration,
    buckets: Mutex<HashMap<(String, Endpoint), RateBucket>>,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            limit: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            retention: Duration::from_secs(config.retention_secs),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, identity: &str, endpoint: Endpoint) -> Decision {
        self.check_at(identity, endpoint, Instant::now())
    }

    /// Count one request and decide whether to admit it.
    pub fn check_at(&self, identity: &str, endpoint: Endpoint, now: Instant) -> Decision {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry((identity.to_owned(), endpoint))
            .or_insert(RateBucket {
                count: 0,
                window_start: now,
            });

        if now.saturating_duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.count = bucket.count.saturating_add(1);

        if bucket.count > self.limit {
            let elapsed = now.saturating_duration_since(bucket.window_start);
            let retry_after = self.window.saturating_sub(elapsed);
            let count = bucket.count;
            drop(buckets);

            TraceEvent::AdmissionRejected {
                identity: identity.to_owned(),
                endpoint: endpoint.as_str().into(),
                count,
                limit: self.limit,
            }
            .emit();
            return Decision::Refused { retry_after };
        }

        Decision::Allowed {
            remaining: self.limit - bucket.count,
        }
    }

    /// Clear every bucket belonging to `identity`. Returns how many went.
    pub fn reset(&self, identity: &str) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|(id, _), _| id != identity);
        before - buckets.len()
    }

    pub fn reset_all(&self) -> usize {
        let mut buckets = self.buckets.lock();
        let n = buckets.len();
        buckets.clear();
        n
    }

    /// Evict buckets whose window ended more than the retention horizon ago.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let horizon = self.window + self.retention;
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < horizon);
        before - buckets.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> AdmissionStats {
        let buckets = self.buckets.lock();
        let mut entries: Vec<BucketStatus> = buckets
            .iter()
            .map(|((identity, endpoint), b)| {
                let elapsed = now.saturating_duration_since(b.window_start);
                let expired = elapsed >= self.window;
                let count = if expired { 0 } else { b.count };
                BucketStatus {
                    identity: identity.clone(),
                    endpoint: *endpoint,
                    count,
                    remaining: self.limit.saturating_sub(count),
                    limited: count >= self.limit,
                    resets_in_secs: self.window.saturating_sub(elapsed).as_secs(),
                }
            })
            .collect();
        drop(buckets);

        entries.sort_by(|a, b| {
            a.identity
                .cmp(&b.identity)
                .then_with(|| a.endpoint.as_str().cmp(b.endpoint.as_str()))
        });
        let mut identities: Vec<&str> = entries.iter().map(|e| e.identity.as_str()).collect();
        identities.dedup();

        AdmissionStats {
            limit: self.limit,
            window_secs: self.window.as_secs(),
            buckets: entries.len(),
            identities: identities.len(),
            limited: entries.iter().filter(|e| e.limited).count(),
            entries,
        }
    }

    pub fn stats(&self) -> AdmissionStats {
        self.stats_at(Instant::now())
    }
}
