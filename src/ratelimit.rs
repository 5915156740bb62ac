//! Fixed-window attempt limiting.
//!
//! Counters live in the shared [`CacheStore`] under
//! `ratelimit:<scope>:<id>` so every instance sees the same count. When the
//! cache cannot answer, a process-local map takes over for that call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheStore, WindowCount};

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalWindow {
    started: Instant,
    count: u32,
}

/// Allows `limit` attempts per key per `window`.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheStore,
    local: Arc<Mutex<HashMap<String, LocalWindow>>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(cache: CacheStore, limit: u32, window: Duration) -> Self {
        Self {
            cache,
            local: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window,
        }
    }

    /// Count one attempt for `id` in `scope` and decide whether it may proceed.
    pub async fn check(&self, scope: &str, id: &str) -> RateDecision {
        let key = format!("ratelimit:{}:{}", scope, id);

        let state = match self.cache.increment(&key, self.window).await {
            Some(state) => state,
            None => self.increment_local(&key).await,
        };
        let count = u32::try_from(state.count).unwrap_or(u32::MAX);

        if count > self.limit {
            debug!(key = %key, count, "Rate limit reached");
            RateDecision::Limited {
                retry_after_secs: whole_seconds(state.resets_in),
            }
        } else {
            RateDecision::Allowed {
                remaining: self.limit - count,
            }
        }
    }

    async fn increment_local(&self, key: &str) -> WindowCount {
        let now = Instant::now();
        let mut windows = self.local.lock().await;

        // Drop finished windows so the map stays bounded by active keys
        windows.retain(|_, w| now.duration_since(w.started) < self.window);

        let entry = windows.entry(key.to_string()).or_insert(LocalWindow {
            started: now,
            count: 0,
        });
        entry.count = entry.count.saturating_add(1);

        WindowCount {
            count: u64::from(entry.count),
            resets_in: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }
}

/// Seconds until a retry can succeed, rounded up and never zero.
fn whole_seconds(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis().div_ceil(1000))
        .unwrap_or(u64::MAX)
        .max(1)
}
