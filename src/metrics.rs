//! Derived metrics: engagement rate, display formatting and growth over
//! stored snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AnalyticsSnapshot;

/// Round to 4 decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// `(likes + comments + shares) / views`, rounded to 4 decimals.
///
/// Zero views always yields 0 regardless of the other counts.
pub fn engagement_rate(likes: u64, comments: u64, shares: u64, views: u64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    let interactions = likes.saturating_add(comments).saturating_add(shares);
    round4(interactions as f64 / views as f64)
}

/// Format a count with K/M/B suffixes: `999`, `1.5K`, `12.3M`, `2B`.
pub fn format_count(value: u64) -> String {
    const UNITS: [(u64, &str); 3] = [
        (1_000_000_000, "B"),
        (1_000_000, "M"),
        (1_000, "K"),
    ];

    for (divisor, suffix) in UNITS {
        if value >= divisor {
            let scaled = (value as f64 / divisor as f64 * 10.0).round() / 10.0;
            let text = format!("{:.1}", scaled);
            let text = text.strip_suffix(".0").unwrap_or(&text);
            return format!("{}{}", text, suffix);
        }
    }

    value.to_string()
}

/// Format an engagement fraction as a percentage with two decimals.
pub fn format_rate(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

/// Growth between the oldest and newest stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthReport {
    pub video_id: String,
    /// Most recent first, as stored.
    pub snapshots: Vec<AnalyticsSnapshot>,
    pub view_growth: i64,
    pub like_growth: i64,
    pub comment_growth: i64,
    /// View growth as a percentage of the oldest view count.
    pub view_growth_percent: f64,
    pub span_hours: f64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl GrowthReport {
    /// Build a report from snapshots ordered most-recent-first.
    pub fn from_snapshots(video_id: &str, snapshots: Vec<AnalyticsSnapshot>) -> Self {
        let newest = snapshots.first().copied();
        let oldest = snapshots.last().copied();

        let (view_growth, like_growth, comment_growth, view_growth_percent, span_hours) =
            match (newest, oldest) {
                (Some(newest), Some(oldest)) if snapshots.len() >= 2 => {
                    let views = delta(newest.views, oldest.views);
                    let percent = if oldest.views > 0 {
                        (views as f64 / oldest.views as f64 * 100.0 * 100.0).round() / 100.0
                    } else {
                        0.0
                    };
                    let span = newest
                        .timestamp
                        .signed_duration_since(oldest.timestamp)
                        .num_seconds()
                        .max(0) as f64
                        / 3600.0;
                    (
                        views,
                        delta(newest.likes, oldest.likes),
                        delta(newest.comments, oldest.comments),
                        percent,
                        (span * 100.0).round() / 100.0,
                    )
                }
                _ => (0, 0, 0, 0.0, 0.0),
            };

        Self {
            video_id: video_id.to_string(),
            first_seen: oldest.map(|s| s.timestamp),
            last_seen: newest.map(|s| s.timestamp),
            snapshots,
            view_growth,
            like_growth,
            comment_growth,
            view_growth_percent,
            span_hours,
        }
    }
}

fn delta(newer: u64, older: u64) -> i64 {
    newer as i64 - older as i64
}
