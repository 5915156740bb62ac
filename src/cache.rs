//! TTL cache and bounded snapshot history.
//!
//! The cache is an optimisation, never a correctness dependency. Every
//! operation on [`CacheStore`] is infallible from the caller's point of view:
//! reads degrade to a miss, writes to `false`. Failures (including timeouts)
//! are logged as `CACHE_UNAVAILABLE` and swallowed.
//!
//! The store holds no locks. Concurrent writers to one key are
//! last-write-wins, and concurrent history pushes may interleave; the length
//! cap is enforced by the backend on every push so it is never exceeded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::model::AnalyticsSnapshot;
use crate::storage::Storage;

/// Maximum snapshots kept per video.
pub const HISTORY_MAX_ENTRIES: usize = 30;

/// History lists expire this long after their last push.
pub const HISTORY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// State of a windowed counter after one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Increments seen in the current window, this one included.
    pub count: u64,
    /// Time until the window closes and the count starts over.
    pub resets_in: Duration,
}

/// Cache key for a fetched video: `video:<platform lowercased>:<id>`.
pub fn video_key(platform: &str, video_id: &str) -> String {
    format!("video:{}:{}", platform.to_lowercase(), video_id)
}

/// Key of the snapshot list for a video: `history:<id>`.
pub fn history_key(video_id: &str) -> String {
    format!("history:{}", video_id)
}

/// Storage operations a cache backend must provide.
///
/// Values are opaque strings; serialisation happens in [`CacheStore`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Remove a key. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;

    /// Prepend to the list at `key`, keep the newest `max_len` items and
    /// reset the list's expiry to `ttl`.
    async fn push_front(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> anyhow::Result<()>;

    /// Up to `count` items of the list at `key`, newest first.
    async fn range(&self, key: &str, count: usize) -> anyhow::Result<Vec<String>>;

    /// Increment a counter that expires `window` after its first increment.
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<WindowCount>;

    /// Delete expired entries. Backends that expire on their own keep the
    /// default.
    async fn purge_expired(&self) -> anyhow::Result<u64> {
        Ok(0)
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Backend connection string. `None` disables the cache.
    pub url: Option<String>,
    pub default_ttl: Duration,
    /// Upper bound on any single backend call.
    pub op_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: None,
            default_ttl: Duration::from_secs(3600),
            op_timeout: Duration::from_millis(2000),
        }
    }
}

/// Shared handle to the cache. Cheap to clone.
#[derive(Clone)]
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
    default_ttl: Duration,
    op_timeout: Duration,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: &CacheSettings) -> Self {
        Self {
            backend: Some(backend),
            default_ttl: settings.default_ttl,
            op_timeout: settings.op_timeout,
        }
    }

    /// A store that misses on every read and refuses every write.
    pub fn disabled() -> Self {
        let settings = CacheSettings::default();
        Self {
            backend: None,
            default_ttl: settings.default_ttl,
            op_timeout: settings.op_timeout,
        }
    }

    /// Connect to the backend named in `settings`.
    ///
    /// A missing URL or a failed connection yields a disabled store.
    pub async fn connect(settings: &CacheSettings) -> Self {
        let Some(url) = settings.url.as_deref() else {
            info!("Cache URL not set, caching disabled");
            return Self::disabled();
        };

        match Storage::new(url).await {
            Ok(storage) => {
                info!("Cache backend connected");
                Self::new(Arc::new(storage), settings)
            }
            Err(e) => {
                warn!(error = %e, "Cache backend unavailable, caching disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Run one backend call under the operation timeout. Any failure is
    /// logged and turned into `None`.
    async fn call<T, F>(&self, op: &'static str, key: &str, fut: F) -> Option<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let outcome = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => CacheError::from(e),
            Err(_) => CacheError::Timeout(self.op_timeout),
        };
        warn!(op, key, code = "CACHE_UNAVAILABLE", error = %outcome, "Cache operation failed");
        None
    }

    /// Read and deserialize a value. Misses and failures both return `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let raw = self.call("get", key, backend.get(key)).await??;

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %CacheError::from(e), "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Serialize and store a value with `ttl`, or the default TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %CacheError::from(e), "Cache value not serializable");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);

        self.call("set", key, backend.set(key, &raw, ttl))
            .await
            .is_some()
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        self.call("delete", key, backend.delete(key))
            .await
            .unwrap_or(false)
    }

    /// Prepend a snapshot to the video's history, keeping the newest 30 and
    /// resetting the list's 30-day expiry.
    pub async fn push_history(&self, video_id: &str, snapshot: &AnalyticsSnapshot) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let key = history_key(video_id);
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %CacheError::from(e), "Snapshot not serializable");
                return false;
            }
        };

        self.call(
            "push_history",
            &key,
            backend.push_front(&key, &raw, HISTORY_MAX_ENTRIES, HISTORY_TTL),
        )
        .await
        .is_some()
    }

    /// The `max_days` most recent snapshots, newest first.
    ///
    /// This is a count of entries, not a time window: with one snapshot per
    /// day it approximates "the last N days", but gaps in collection make it
    /// reach further back.
    pub async fn read_history(&self, video_id: &str, max_days: usize) -> Vec<AnalyticsSnapshot> {
        let Some(backend) = self.backend.as_ref() else {
            return Vec::new();
        };
        let key = history_key(video_id);
        let Some(raw) = self
            .call("read_history", &key, backend.range(&key, max_days))
            .await
        else {
            return Vec::new();
        };

        raw.iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(key, error = %e, "Skipping unreadable snapshot");
                    None
                }
            })
            .collect()
    }

    /// Bump a windowed counter. `None` when the cache cannot answer.
    pub async fn increment(&self, key: &str, window: Duration) -> Option<WindowCount> {
        let backend = self.backend.as_ref()?;
        self.call("increment", key, backend.increment(key, window))
            .await
    }

    /// Drop expired entries from the backend. Returns how many were removed.
    pub async fn purge_expired(&self) -> Option<u64> {
        let backend = self.backend.as_ref()?;
        self.call("purge_expired", "*", backend.purge_expired()).await
    }
}
