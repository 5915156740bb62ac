//! The analytics pipeline: URL in, [`AnalyticsResult`] out.
//!
//! ```text
//! url -> PlatformResolver -> cache? -> KeyResolver -> VideoSource::fetch
//!     -> sentiment, keywords, metrics -> cache write + history push
//! ```
//!
//! Cache writes and history pushes are best-effort: the pipeline produces
//! the same result with the cache disabled, it just fetches every time.
//!
//! There is no coalescing of concurrent misses. Two requests for the same
//! cold key both fetch and both write, and the last write wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, HISTORY_MAX_ENTRIES, video_key};
use crate::credentials::{KeyResolver, KeySource, KeySourceReport};
use crate::data_sources::{RawVideoData, SourceRegistry, VideoSource};
use crate::error::{Error, ErrorKind, ErrorReport, Result};
use crate::keywords::{self, extract_hashtags, extract_keywords};
use crate::metrics::GrowthReport;
use crate::model::{AnalyticsResult, AnalyticsSnapshot, AnalyzedComment, Metrics, ResultMeta};
use crate::platform::{Platform, PlatformResolver};
use crate::ratelimit::{RateDecision, RateLimiter};
use crate::sentiment::SentimentEngine;

/// Rate-limit scope for credential tests.
const KEY_TEST_SCOPE: &str = "key-test";

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    /// TTL for platforms without their own entry.
    pub default_ttl: Duration,
    pub platform_ttls: HashMap<Platform, Duration>,
    pub top_comments: usize,
    pub keyword_limit: usize,
    pub hashtag_limit: usize,
    /// Credential tests allowed per user per `key_test_window`.
    pub key_test_limit: u32,
    pub key_test_window: Duration,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            platform_ttls: HashMap::from([
                (Platform::Youtube, Duration::from_secs(3600)),
                (Platform::Instagram, Duration::from_secs(1800)),
            ]),
            top_comments: 5,
            keyword_limit: keywords::DEFAULT_LIMIT,
            hashtag_limit: keywords::DEFAULT_LIMIT,
            key_test_limit: 5,
            key_test_window: Duration::from_secs(60),
        }
    }
}

impl AnalyticsSettings {
    pub fn ttl_for(&self, platform: Platform) -> Duration {
        self.platform_ttls
            .get(&platform)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Per-request options.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeOptions {
    pub skip_cache: bool,
    pub include_sentiment: bool,
    pub include_keywords: bool,
    /// Credential override for this request only.
    pub user_key: Option<String>,
    /// Authenticated user; set by the boundary, never read from the body.
    #[serde(skip)]
    pub user_id: Option<String>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            skip_cache: false,
            include_sentiment: true,
            include_keywords: true,
            user_key: None,
            user_id: None,
        }
    }
}

impl std::fmt::Debug for AnalyzeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzeOptions")
            .field("skip_cache", &self.skip_cache)
            .field("include_sentiment", &self.include_sentiment)
            .field("include_keywords", &self.include_keywords)
            .field("user_key", &self.user_key.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Availability of one detectable platform for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    pub platform: Platform,
    pub supported: bool,
    /// Supported, adapter operational and a credential is resolvable.
    pub enabled: bool,
    pub key_source: KeySource,
}

/// Outcome of testing a candidate credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyTestResult {
    pub platform: Platform,
    pub valid: bool,
    pub error: Option<ErrorReport>,
    /// Tests left in the current window.
    pub remaining: u32,
}

/// Orchestrates resolution, caching, fetching and analysis.
pub struct AnalyticsAggregator {
    resolver: PlatformResolver,
    keys: KeyResolver,
    sources: SourceRegistry,
    cache: CacheStore,
    sentiment: SentimentEngine,
    limiter: RateLimiter,
    settings: AnalyticsSettings,
}

impl AnalyticsAggregator {
    pub fn new(
        resolver: PlatformResolver,
        keys: KeyResolver,
        sources: SourceRegistry,
        cache: CacheStore,
        sentiment: SentimentEngine,
        settings: AnalyticsSettings,
    ) -> Self {
        let limiter = RateLimiter::new(
            cache.clone(),
            settings.key_test_limit,
            settings.key_test_window,
        );

        Self {
            resolver,
            keys,
            sources,
            cache,
            sentiment,
            limiter,
            settings,
        }
    }

    pub fn resolver(&self) -> &PlatformResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The registered, operational source for a supported platform.
    fn source_for(&self, platform: Platform) -> Result<Arc<dyn VideoSource>> {
        self.sources
            .get(platform)
            .filter(|source| source.is_enabled())
            .ok_or_else(|| Error::service_not_configured(platform))
    }

    /// Resolve the platform, its source and the video id in `url`.
    fn locate(&self, url: &str) -> Result<(Platform, Arc<dyn VideoSource>, String)> {
        let platform = self.resolver.resolve(url)?;
        let source = self.source_for(platform)?;
        let video_id = source.extract_id(url).ok_or_else(|| {
            Error::invalid_input(format!("no {} video id found in '{}'", platform, url.trim()))
        })?;

        Ok((platform, source, video_id))
    }

    /// Analyze one video URL.
    ///
    /// # Arguments
    ///
    /// * `url` - Video URL on a supported platform
    /// * `options` - Cache bypass, section filters and credential inputs
    ///
    /// # Returns
    ///
    /// The assembled result, with `meta.fromCache` telling whether it came
    /// from the cache.
    pub async fn analyze(&self, url: &str, options: &AnalyzeOptions) -> Result<AnalyticsResult> {
        let (platform, source, video_id) = self.locate(url)?;
        let cache_key = video_key(platform.as_str(), &video_id);

        if !options.skip_cache {
            if let Some(mut cached) = self.cache.get::<AnalyticsResult>(&cache_key).await {
                info!(%platform, cache_key = %cache_key, "Serving cached analytics");
                cached.meta.from_cache = true;
                return Ok(cached.filtered(options.include_sentiment, options.include_keywords));
            }
        }

        let credential = self.credential_for(platform, options).await?;

        let raw = source.fetch(url, &credential).await.inspect_err(|e| {
            warn!(%platform, video_id = %video_id, code = e.code(), error = %e, "Fetch failed");
        })?;

        let result = self.assemble(platform, raw, cache_key.clone());

        let ttl = self.settings.ttl_for(platform);
        if !self.cache.set(&cache_key, &result, Some(ttl)).await {
            debug!(cache_key = %cache_key, "Result not cached");
        }
        let snapshot = AnalyticsSnapshot::from_metrics(result.meta.fetched_at, &result.metrics);
        self.cache.push_history(&video_id, &snapshot).await;

        info!(
            %platform,
            cache_key = %cache_key,
            views = result.metrics.views,
            "Analyzed video"
        );

        Ok(result.filtered(options.include_sentiment, options.include_keywords))
    }

    /// Request override first, then the resolver's user-or-system choice.
    async fn credential_for(&self, platform: Platform, options: &AnalyzeOptions) -> Result<String> {
        if let Some(key) = options.user_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                debug!(%platform, source = "override", "Credential resolved");
                return Ok(key.to_string());
            }
        }

        self.keys
            .resolve(options.user_id.as_deref(), platform)
            .await
            .ok_or_else(|| Error::service_not_configured(platform))
    }

    /// Build the full result. Sentiment and keyword sections are always
    /// computed so the cached value does not depend on request options.
    fn assemble(&self, platform: Platform, raw: RawVideoData, cache_key: String) -> AnalyticsResult {
        let metrics = Metrics::from_counts(raw.counts);

        let analyzed = self.sentiment.analyze_comments(&raw.comments);
        let sentiment = self.sentiment.summarize(&analyzed);

        let texts = [raw.video.title.as_str(), raw.video.description.as_str()];
        let keywords = extract_keywords(&texts, &raw.video.tags, self.settings.keyword_limit);
        let hashtags = extract_hashtags(&texts, self.settings.hashtag_limit);

        AnalyticsResult {
            meta: ResultMeta {
                fetched_at: raw.video.fetched_at,
                from_cache: false,
                platform,
                cache_key,
            },
            video: raw.video,
            channel: raw.channel,
            metrics,
            sentiment: Some(sentiment),
            keywords,
            hashtags,
            top_comments: top_comments(analyzed, self.settings.top_comments),
        }
    }

    /// Stored snapshots for the video at `url` and the growth between them.
    ///
    /// `days` is the number of most recent snapshots, not a time window.
    pub async fn history(&self, url: &str, days: usize) -> Result<GrowthReport> {
        if days == 0 {
            return Err(Error::invalid_input("days must be at least 1"));
        }
        let (_, _, video_id) = self.locate(url)?;

        let snapshots = self
            .cache
            .read_history(&video_id, days.min(HISTORY_MAX_ENTRIES))
            .await;

        Ok(GrowthReport::from_snapshots(&video_id, snapshots))
    }

    /// Where a credential for `platform` would come from.
    pub async fn key_source(&self, user_id: Option<&str>, platform: Platform) -> KeySourceReport {
        self.keys.source(user_id, platform).await
    }

    /// Every detectable platform and whether the user can analyze it now.
    pub async fn platform_status(&self, user_id: Option<&str>) -> Vec<PlatformStatus> {
        let mut statuses = Vec::with_capacity(Platform::ALL.len());

        for platform in Platform::ALL {
            let supported = self.resolver.is_supported(platform);
            let operational = self.source_for(platform).is_ok();
            let key_source = self.keys.source(user_id, platform).await.source;

            statuses.push(PlatformStatus {
                platform,
                supported,
                enabled: supported && operational && key_source != KeySource::None,
                key_source,
            });
        }

        statuses
    }

    /// Check a candidate credential against the platform.
    ///
    /// Attempts are limited per user. A rejected key is a successful test
    /// with `valid: false`, not an error.
    pub async fn test_credential(
        &self,
        user_id: Option<&str>,
        platform: Platform,
        credential: &str,
    ) -> Result<KeyTestResult> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(Error::invalid_input("apiKey is required"));
        }
        if !self.resolver.is_supported(platform) {
            return Err(Error::unsupported_platform(format!(
                "{} is not supported",
                platform
            )));
        }

        let remaining = match self
            .limiter
            .check(KEY_TEST_SCOPE, user_id.unwrap_or("anonymous"))
            .await
        {
            RateDecision::Allowed { remaining } => remaining,
            RateDecision::Limited { retry_after_secs } => {
                return Err(Error::rate_limited(retry_after_secs));
            }
        };

        let source = self.source_for(platform)?;
        let outcome = source.validate_credential(credential).await;

        match outcome {
            Ok(()) => Ok(KeyTestResult {
                platform,
                valid: true,
                error: None,
                remaining,
            }),
            Err(e) if matches!(e.kind(), ErrorKind::Upstream { .. }) => {
                info!(%platform, code = e.code(), "Credential test failed");
                Ok(KeyTestResult {
                    platform,
                    valid: false,
                    error: Some(e.report()),
                    remaining,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// The `limit` most-liked comments. Ties keep fetch order.
fn top_comments(mut analyzed: Vec<AnalyzedComment>, limit: usize) -> Vec<AnalyzedComment> {
    analyzed.sort_by(|a, b| b.comment.like_count.cmp(&a.comment.like_count));
    analyzed.truncate(limit);
    analyzed
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::data_sources::youtube::extract_video_id;
    use crate::error::UpstreamKind;
    use crate::model::{Channel, Comment, RawCounts, Video};
    use crate::sentiment::SentimentLabel;
    use crate::storage::Storage;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const URL: &str = "https://www.youtube.com/watch?v=abcDEF12345";

    /// In-process YouTube stand-in that records every fetch.
    #[derive(Default)]
    pub(crate) struct StubSource {
        pub fetches: AtomicUsize,
        pub credentials: Mutex<Vec<String>>,
        pub views: AtomicUsize,
        /// Per-video view counts, taking precedence over `views`.
        pub views_by_id: Mutex<HashMap<String, u64>>,
    }

    impl StubSource {
        pub fn with_views(views: usize) -> Self {
            let stub = Self::default();
            stub.views.store(views, Ordering::SeqCst);
            stub
        }
    }

    fn comment(id: &str, content: &str, likes: u64) -> Comment {
        Comment {
            id: id.to_string(),
            author: format!("viewer-{}", id),
            content: content.to_string(),
            like_count: likes,
            published_at: None,
        }
    }

    #[async_trait]
    impl VideoSource for StubSource {
        fn platform(&self) -> Platform {
            Platform::Youtube
        }

        fn extract_id(&self, url: &str) -> Option<String> {
            extract_video_id(url)
        }

        async fn fetch(&self, url: &str, credential: &str) -> Result<RawVideoData> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.credentials.lock().unwrap().push(credential.to_string());

            if credential == "revoked" {
                return Err(Error::upstream(
                    Platform::Youtube,
                    UpstreamKind::InvalidCredential,
                    "API key not valid",
                ));
            }

            let id = extract_video_id(url).unwrap();
            let views = self
                .views_by_id
                .lock()
                .unwrap()
                .get(&id)
                .copied()
                .unwrap_or(self.views.load(Ordering::SeqCst) as u64);
            Ok(RawVideoData {
                video: Video {
                    platform: Platform::Youtube,
                    id: id.clone(),
                    title: format!("Rust tutorial {}", id),
                    description: "Learn rust fast #rust #coding".to_string(),
                    thumbnail: None,
                    published_at: None,
                    duration: Some(600),
                    tags: vec!["rust".to_string()],
                    channel_id: "UC1".to_string(),
                    fetched_at: Utc::now(),
                },
                channel: Channel {
                    platform: Platform::Youtube,
                    id: "UC1".to_string(),
                    name: "Rustacean".to_string(),
                    subscriber_count: Some(100),
                    video_count: None,
                    view_count: None,
                    thumbnail: None,
                },
                counts: RawCounts {
                    views,
                    likes: views / 10,
                    comments: 6,
                    shares: 0,
                },
                comments: vec![
                    comment("1", "I love this, amazing work", 50),
                    comment("2", "great explanation", 2),
                    comment("3", "terrible audio", 0),
                    comment("4", "first", 9),
                    comment("5", "so helpful thanks", 30),
                    comment("6", "ok", 1),
                ],
            })
        }

        async fn validate_credential(&self, credential: &str) -> Result<()> {
            if credential == "good" {
                Ok(())
            } else {
                Err(Error::upstream(
                    Platform::Youtube,
                    UpstreamKind::InvalidCredential,
                    "API key not valid",
                ))
            }
        }
    }

    async fn sqlite_cache() -> CacheStore {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        CacheStore::new(Arc::new(storage), &CacheSettings::default())
    }

    fn aggregator(
        source: Arc<StubSource>,
        cache: CacheStore,
        keys: KeyResolver,
    ) -> AnalyticsAggregator {
        AnalyticsAggregator::new(
            PlatformResolver::default(),
            keys,
            SourceRegistry::new().register(source),
            cache,
            SentimentEngine::new(),
            AnalyticsSettings::default(),
        )
    }

    fn system_keys() -> KeyResolver {
        KeyResolver::new(
            None,
            HashMap::from([(Platform::Youtube, "system-key".to_string())]),
        )
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let source = Arc::new(StubSource::with_views(10_000));
        let aggregator = aggregator(source.clone(), sqlite_cache().await, system_keys());
        let options = AnalyzeOptions::default();

        let first = aggregator.analyze(URL, &options).await.unwrap();
        let second = aggregator.analyze(URL, &options).await.unwrap();

        assert!(!first.meta.from_cache);
        assert!(second.meta.from_cache);
        assert_eq!(first.meta.cache_key, "video:youtube:abcDEF12345");
        assert_eq!(second.meta.cache_key, first.meta.cache_key);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_value_round_trips() {
        let source = Arc::new(StubSource::with_views(10_000));
        let aggregator = aggregator(source, sqlite_cache().await, system_keys());
        let options = AnalyzeOptions::default();

        let fresh = aggregator.analyze(URL, &options).await.unwrap();
        let cached = aggregator.analyze(URL, &options).await.unwrap();

        let mut expected = fresh.clone();
        expected.meta.from_cache = true;
        assert_eq!(cached, expected);
    }

    #[tokio::test]
    async fn test_skip_cache_refetches() {
        let source = Arc::new(StubSource::with_views(10_000));
        let aggregator = aggregator(source.clone(), sqlite_cache().await, system_keys());

        aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();
        let result = aggregator
            .analyze(
                URL,
                &AnalyzeOptions {
                    skip_cache: true,
                    ..AnalyzeOptions::default()
                },
            )
            .await
            .unwrap();

        assert!(!result.meta.from_cache);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_works_with_cache_disabled() {
        let source = Arc::new(StubSource::with_views(10_000));
        let aggregator = aggregator(source.clone(), CacheStore::disabled(), system_keys());

        let first = aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();
        let second = aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();

        assert!(!first.meta.from_cache);
        assert!(!second.meta.from_cache);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        let report = aggregator.history(URL, 7).await.unwrap();
        assert!(report.snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_result_sections() {
        let source = Arc::new(StubSource::with_views(10_000));
        let aggregator = aggregator(source, CacheStore::disabled(), system_keys());

        let result = aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();

        assert_eq!(result.metrics.engagement_rate, 0.1006);
        assert_eq!(result.metrics.formatted.views, "10K");
        assert_eq!(result.metrics.formatted.engagement_rate, "10.06%");

        let sentiment = result.sentiment.unwrap();
        assert_eq!(sentiment.total_analyzed, 6);
        assert_eq!(sentiment.label, SentimentLabel::Positive);

        let liked: Vec<u64> = result
            .top_comments
            .iter()
            .map(|c| c.comment.like_count)
            .collect();
        assert_eq!(liked, vec![50, 30, 9, 2, 1]);
        assert!(result.top_comments[0].sentiment_label.is_some());

        assert_eq!(result.keywords[0].keyword, "rust");
        assert!(result.hashtags.iter().any(|h| h.hashtag == "#coding"));
    }

    #[tokio::test]
    async fn test_options_filter_sections_but_not_cache() {
        let source = Arc::new(StubSource::with_views(10_000));
        let aggregator = aggregator(source, sqlite_cache().await, system_keys());
        let bare = AnalyzeOptions {
            include_sentiment: false,
            include_keywords: false,
            ..AnalyzeOptions::default()
        };

        let result = aggregator.analyze(URL, &bare).await.unwrap();
        assert!(result.sentiment.is_none());
        assert!(result.keywords.is_empty());
        assert!(result.hashtags.is_empty());
        assert!(result.top_comments[0].sentiment_score.is_none());

        let cached = aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();
        assert!(cached.meta.from_cache);
        assert!(cached.sentiment.is_some());
        assert!(!cached.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_zero_views_zero_engagement() {
        let source = Arc::new(StubSource::with_views(0));
        let aggregator = aggregator(source, CacheStore::disabled(), system_keys());

        let result = aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();

        assert_eq!(result.metrics.engagement_rate, 0.0);
    }

    #[tokio::test]
    async fn test_unsupported_and_invalid_urls() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source.clone(), CacheStore::disabled(), system_keys());
        let options = AnalyzeOptions::default();

        let err = aggregator
            .analyze("https://www.tiktok.com/@a/video/1", &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PLATFORM");

        let err = aggregator
            .analyze("https://example.com/clip", &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PLATFORM");

        let err = aggregator.analyze("  ", &options).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        let err = aggregator
            .analyze("https://www.youtube.com/feed/trending", &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_is_service_not_configured() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source.clone(), CacheStore::disabled(), KeyResolver::default());

        let err = aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "SERVICE_NOT_CONFIGURED");
        assert_eq!(err.status(), 503);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_platform_without_adapter_is_service_not_configured() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source, CacheStore::disabled(), system_keys());

        let err = aggregator
            .analyze("https://www.instagram.com/p/Cabc123/", &AnalyzeOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "SERVICE_NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn test_credential_precedence() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        storage
            .insert_credential("user-1", Platform::Youtube, "user-key")
            .await
            .unwrap();
        let keys = KeyResolver::new(
            Some(Arc::new(storage)),
            HashMap::from([(Platform::Youtube, "system-key".to_string())]),
        );
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source.clone(), CacheStore::disabled(), keys);

        let as_user = AnalyzeOptions {
            user_id: Some("user-1".to_string()),
            ..AnalyzeOptions::default()
        };
        aggregator.analyze(URL, &as_user).await.unwrap();
        aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();
        aggregator
            .analyze(
                URL,
                &AnalyzeOptions {
                    user_key: Some("override-key".to_string()),
                    ..as_user.clone()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            *source.credentials.lock().unwrap(),
            vec!["user-key", "system-key", "override-key"]
        );
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source, sqlite_cache().await, system_keys());
        let options = AnalyzeOptions {
            user_key: Some("revoked".to_string()),
            ..AnalyzeOptions::default()
        };

        let err = aggregator.analyze(URL, &options).await.unwrap_err();

        assert_eq!(err.code(), "INVALID_API_KEY");
        assert!(aggregator.history(URL, 30).await.unwrap().snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_history_grows_with_each_fetch() {
        let source = Arc::new(StubSource::with_views(1_000));
        let aggregator = aggregator(source.clone(), sqlite_cache().await, system_keys());
        let fresh = AnalyzeOptions {
            skip_cache: true,
            ..AnalyzeOptions::default()
        };

        aggregator.analyze(URL, &fresh).await.unwrap();
        source.views.store(1_500, Ordering::SeqCst);
        aggregator.analyze(URL, &fresh).await.unwrap();
        // Cache hits do not add snapshots
        aggregator
            .analyze(URL, &AnalyzeOptions::default())
            .await
            .unwrap();

        let report = aggregator.history(URL, 7).await.unwrap();
        assert_eq!(report.video_id, "abcDEF12345");
        assert_eq!(report.snapshots.len(), 2);
        assert_eq!(report.snapshots[0].views, 1_500);
        assert_eq!(report.view_growth, 500);
        assert_eq!(report.view_growth_percent, 50.0);

        let latest_only = aggregator.history(URL, 1).await.unwrap();
        assert_eq!(latest_only.snapshots.len(), 1);

        let err = aggregator.history(URL, 0).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_platform_status() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source, CacheStore::disabled(), system_keys());

        let statuses = aggregator.platform_status(None).await;

        assert_eq!(statuses.len(), 4);
        let youtube = &statuses[0];
        assert_eq!(youtube.platform, Platform::Youtube);
        assert!(youtube.supported && youtube.enabled);
        assert_eq!(youtube.key_source, KeySource::System);

        let instagram = &statuses[1];
        assert!(instagram.supported);
        assert!(!instagram.enabled);
        assert_eq!(instagram.key_source, KeySource::None);

        assert!(statuses[2..].iter().all(|s| !s.supported && !s.enabled));
    }

    #[tokio::test]
    async fn test_credential_test_flow() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source, CacheStore::disabled(), system_keys());

        let ok = aggregator
            .test_credential(Some("user-1"), Platform::Youtube, "good")
            .await
            .unwrap();
        assert!(ok.valid);
        assert_eq!(ok.remaining, 4);

        let bad = aggregator
            .test_credential(Some("user-1"), Platform::Youtube, "nope")
            .await
            .unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.error.unwrap().code, "INVALID_API_KEY");

        let err = aggregator
            .test_credential(Some("user-1"), Platform::Vimeo, "good")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PLATFORM");

        let err = aggregator
            .test_credential(Some("user-1"), Platform::Youtube, " ")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_credential_tests_are_rate_limited() {
        let source = Arc::new(StubSource::with_views(1));
        let aggregator = aggregator(source, CacheStore::disabled(), system_keys());

        for _ in 0..5 {
            aggregator
                .test_credential(Some("user-1"), Platform::Youtube, "good")
                .await
                .unwrap();
        }
        let err = aggregator
            .test_credential(Some("user-1"), Platform::Youtube, "good")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "RATE_LIMITED");
        assert_eq!(err.status(), 429);
        assert!(
            aggregator
                .test_credential(Some("user-2"), Platform::Youtube, "good")
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: AnalyzeOptions =
            serde_json::from_str(r#"{"skipCache": true, "userId": "spoofed"}"#).unwrap();

        assert!(options.skip_cache);
        assert!(options.include_sentiment);
        assert!(options.include_keywords);
        assert!(options.user_id.is_none());
        assert!(!format!("{:?}", AnalyzeOptions {
            user_key: Some("secret".to_string()),
            ..AnalyzeOptions::default()
        })
        .contains("secret"));
    }
}
