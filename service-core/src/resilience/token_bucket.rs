//! Keyed token-bucket admission control.
//!
//! Each key owns a bucket holding up to `capacity` tokens. A request consumes one
//! token; the bucket is topped back up to `capacity` once per elapsed `window`.
//! Buckets are created lazily on first use and live only in this process.
//!
//! The map shard lock is held only long enough to fetch or create a bucket; the
//! consume step locks that single bucket, so unrelated keys never contend.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Quota applied to one class of callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub capacity: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Tokens left after this check.
    pub remaining: u32,
    /// Set on denial: how long the caller should back off.
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct Bucket {
    capacity: u32,
    tokens: u32,
    window: Duration,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn new(policy: &RateLimitPolicy, now: Instant) -> Self {
        Self {
            capacity: policy.capacity,
            tokens: policy.capacity,
            window: policy.window,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        if self.window.is_zero() {
            self.tokens = self.capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed < self.window {
            return;
        }

        // Refill amount equals capacity, so one elapsed window already means full.
        let windows = (elapsed.as_nanos() / self.window.as_nanos()) as u32;
        self.tokens = self.capacity;
        self.last_refill += self.window * windows;
    }

    fn try_consume(&mut self, now: Instant) -> RateDecision {
        self.refill(now);
        self.last_seen = now;

        if self.tokens > 0 {
            self.tokens -= 1;
            RateDecision {
                allowed: true,
                remaining: self.tokens,
                retry_after: None,
            }
        } else {
            RateDecision {
                allowed: false,
                remaining: 0,
                retry_after: Some(self.window),
            }
        }
    }
}

/// Concurrent map of token buckets keyed by caller identity (`user:42`, `ip:1.2.3.4`).
#[derive(Debug, Default)]
pub struct TokenBucketLimiter {
    buckets: DashMap<String, Arc<Mutex<Bucket>>>,
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one token from `key`'s bucket, creating it under `policy` if absent.
    pub fn try_consume(&self, key: &str, policy: &RateLimitPolicy) -> RateDecision {
        let now = Instant::now();

        let bucket = match self.buckets.get(key) {
            Some(existing) => existing.value().clone(),
            None => self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(policy, now))))
                .value()
                .clone(),
        };

        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_consume(now)
    }

    /// Drop buckets that have not been touched for `max_idle`.
    ///
    /// An idle bucket is necessarily full again once `max_idle >= window`, so
    /// eviction is invisible to callers.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            now.saturating_duration_since(bucket.last_seen) < max_idle
        });
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
