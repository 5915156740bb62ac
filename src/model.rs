//! Data models for clipsight.
//!
//! All values here are immutable snapshots: a new fetch produces new values,
//! and analysing a comment produces an [`AnalyzedComment`] that carries the
//! original fields rather than mutating the [`Comment`].
//!
//! Wire names are camelCase because these shapes are consumed outside the
//! crate (HTTP responses and cached JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keywords::{Hashtag, Keyword};
use crate::metrics;
use crate::platform::Platform;
use crate::sentiment::{SentimentAnalysis, SentimentLabel};

/// A video as reported by its platform at `fetched_at`.
///
/// Identity is `(platform, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub platform: Platform,
    /// Platform-scoped video id (YouTube id, Instagram shortcode).
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Duration in seconds, when the platform reports one.
    pub duration: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub channel_id: String,
    pub fetched_at: DateTime<Utc>,
}

/// The channel or account that published a video.
///
/// Identity is `(platform, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub platform: Platform,
    pub id: String,
    pub name: String,
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
}

/// A comment as fetched from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub like_count: u64,
    pub published_at: Option<DateTime<Utc>>,
}

/// A comment plus its sentiment, once analysed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedComment {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_label: Option<SentimentLabel>,
}

impl AnalyzedComment {
    pub fn scored(comment: Comment, score: f64, label: SentimentLabel) -> Self {
        Self {
            comment,
            sentiment_score: Some(score),
            sentiment_label: Some(label),
        }
    }

    /// The same comment with its sentiment fields dropped.
    pub fn without_sentiment(self) -> Self {
        Self {
            comment: self.comment,
            sentiment_score: None,
            sentiment_label: None,
        }
    }
}

/// Raw engagement counts as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCounts {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

/// Display strings for [`Metrics`]. Pure formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedMetrics {
    pub views: String,
    pub likes: String,
    pub comments: String,
    pub shares: String,
    pub engagement_rate: String,
}

/// Counts plus derived engagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    /// `(likes + comments + shares) / views` as a fraction, 0 when views is 0.
    pub engagement_rate: f64,
    pub formatted: FormattedMetrics,
}

impl Metrics {
    pub fn from_counts(counts: RawCounts) -> Self {
        let engagement_rate = metrics::engagement_rate(
            counts.likes,
            counts.comments,
            counts.shares,
            counts.views,
        );

        Self {
            views: counts.views,
            likes: counts.likes,
            comments: counts.comments,
            shares: counts.shares,
            engagement_rate,
            formatted: FormattedMetrics {
                views: metrics::format_count(counts.views),
                likes: metrics::format_count(counts.likes),
                comments: metrics::format_count(counts.comments),
                shares: metrics::format_count(counts.shares),
                engagement_rate: metrics::format_rate(engagement_rate),
            },
        }
    }
}

/// One historical observation of a video's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

impl AnalyticsSnapshot {
    pub fn from_metrics(timestamp: DateTime<Utc>, metrics: &Metrics) -> Self {
        Self {
            timestamp,
            views: metrics.views,
            likes: metrics.likes,
            comments: metrics.comments,
        }
    }
}

/// Provenance of an [`AnalyticsResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub fetched_at: DateTime<Utc>,
    pub from_cache: bool,
    pub platform: Platform,
    pub cache_key: String,
}

/// Everything the pipeline knows about one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResult {
    pub video: Video,
    pub channel: Channel,
    pub metrics: Metrics,
    pub sentiment: Option<SentimentAnalysis>,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub hashtags: Vec<Hashtag>,
    #[serde(default)]
    pub top_comments: Vec<AnalyzedComment>,
    pub meta: ResultMeta,
}

impl AnalyticsResult {
    /// Drop the sections a caller did not ask for.
    pub fn filtered(mut self, include_sentiment: bool, include_keywords: bool) -> Self {
        if !include_sentiment {
            self.sentiment = None;
            self.top_comments = self
                .top_comments
                .into_iter()
                .map(AnalyzedComment::without_sentiment)
                .collect();
        }
        if !include_keywords {
            self.keywords.clear();
            self.hashtags.clear();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment() -> Comment {
        Comment {
            id: "c1".to_string(),
            author: "viewer".to_string(),
            content: "great video".to_string(),
            like_count: 12,
            published_at: None,
        }
    }

    #[test]
    fn test_metrics_from_counts() {
        let metrics = Metrics::from_counts(RawCounts {
            views: 10_000,
            likes: 450,
            comments: 50,
            shares: 0,
        });

        assert_eq!(metrics.engagement_rate, 0.05);
        assert_eq!(metrics.formatted.views, "10K");
        assert_eq!(metrics.formatted.engagement_rate, "5.00%");
    }

    #[test]
    fn test_metrics_zero_views() {
        let metrics = Metrics::from_counts(RawCounts {
            views: 0,
            likes: 10,
            comments: 5,
            shares: 2,
        });

        assert_eq!(metrics.engagement_rate, 0.0);
    }

    #[test]
    fn test_analyzed_comment_flattens_original_fields() {
        let analyzed = AnalyzedComment::scored(comment(), 0.75, SentimentLabel::Positive);
        let json = serde_json::to_value(&analyzed).unwrap();

        assert_eq!(json["id"], "c1");
        assert_eq!(json["likeCount"], 12);
        assert_eq!(json["sentimentScore"], 0.75);
        assert_eq!(json["sentimentLabel"], "POSITIVE");

        let back: AnalyzedComment = serde_json::from_value(json).unwrap();
        assert_eq!(back, analyzed);
    }

    #[test]
    fn test_unscored_comment_omits_sentiment_fields() {
        let analyzed =
            AnalyzedComment::scored(comment(), 0.2, SentimentLabel::Positive).without_sentiment();
        let json = serde_json::to_value(&analyzed).unwrap();

        assert!(json.get("sentimentScore").is_none());
        assert_eq!(analyzed.comment, comment());
    }

    #[test]
    fn test_snapshot_timestamp_is_iso8601() {
        let snapshot = AnalyticsSnapshot {
            timestamp: "2024-05-01T12:00:00Z".parse().unwrap(),
            views: 100,
            likes: 10,
            comments: 1,
        };
        let json = serde_json::to_value(snapshot).unwrap();

        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(json["views"], 100);
    }
}
