//! Side-by-side comparison of several videos.
//!
//! Every URL runs through the full pipeline concurrently. One URL failing
//! does not affect the others: its error is recorded on its own item.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregation::{AnalyticsAggregator, AnalyzeOptions};
use crate::error::{Error, ErrorReport, Result};
use crate::model::AnalyticsResult;

/// Smallest meaningful comparison.
pub const MIN_BATCH: usize = 2;

/// One URL's outcome. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonItem {
    pub url: String,
    /// 1-based position in the ranking; `None` for failed items.
    pub rank: Option<usize>,
    pub result: Option<AnalyticsResult>,
    pub error: Option<ErrorReport>,
}

/// Index into [`ComparisonResult::items`] of the best item per metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricLeaders {
    pub views: Option<usize>,
    pub likes: Option<usize>,
    pub comments: Option<usize>,
    pub engagement_rate: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// In request order.
    pub items: Vec<ComparisonItem>,
    pub leaders: MetricLeaders,
    pub succeeded: usize,
    pub failed: usize,
    pub compared_at: DateTime<Utc>,
}

impl ComparisonResult {
    /// The rank-1 item, if any URL succeeded.
    pub fn top_performer(&self) -> Option<&ComparisonItem> {
        self.items.iter().find(|item| item.rank == Some(1))
    }
}

/// Runs the aggregator over a batch of URLs.
pub struct ComparisonEngine {
    aggregator: Arc<AnalyticsAggregator>,
    max_batch: usize,
}

impl ComparisonEngine {
    pub fn new(aggregator: Arc<AnalyticsAggregator>, max_batch: usize) -> Self {
        Self {
            aggregator,
            max_batch: max_batch.max(MIN_BATCH),
        }
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Analyze every URL and rank the successes by views, then engagement.
    ///
    /// # Arguments
    ///
    /// * `urls` - Between 2 and the configured batch limit
    /// * `options` - Applied to every URL
    pub async fn compare(&self, urls: &[String], options: &AnalyzeOptions) -> Result<ComparisonResult> {
        if urls.len() < MIN_BATCH || urls.len() > self.max_batch {
            return Err(Error::invalid_input(format!(
                "compare needs between {} and {} urls, got {}",
                MIN_BATCH,
                self.max_batch,
                urls.len()
            )));
        }

        let outcomes = join_all(
            urls.iter()
                .map(|url| self.aggregator.analyze(url, options)),
        )
        .await;

        let mut items: Vec<ComparisonItem> = urls
            .iter()
            .zip(outcomes)
            .map(|(url, outcome)| match outcome {
                Ok(result) => ComparisonItem {
                    url: url.clone(),
                    rank: None,
                    result: Some(result),
                    error: None,
                },
                Err(e) => ComparisonItem {
                    url: url.clone(),
                    rank: None,
                    result: None,
                    error: Some(e.report()),
                },
            })
            .collect();

        assign_ranks(&mut items);
        let leaders = find_leaders(&items);
        let succeeded = items.iter().filter(|item| item.result.is_some()).count();
        let failed = items.len() - succeeded;

        info!(urls = items.len(), succeeded, failed, "Comparison complete");

        Ok(ComparisonResult {
            items,
            leaders,
            succeeded,
            failed,
            compared_at: Utc::now(),
        })
    }
}

/// Views descending, then engagement rate descending.
fn by_performance(a: &AnalyticsResult, b: &AnalyticsResult) -> Ordering {
    b.metrics
        .views
        .cmp(&a.metrics.views)
        .then_with(|| b.metrics.engagement_rate.total_cmp(&a.metrics.engagement_rate))
}

/// Rank successful items. Ties keep request order.
fn assign_ranks(items: &mut [ComparisonItem]) {
    let mut ranked: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.result.is_some())
        .map(|(index, _)| index)
        .collect();

    ranked.sort_by(|&a, &b| match (&items[a].result, &items[b].result) {
        (Some(ra), Some(rb)) => by_performance(ra, rb),
        _ => Ordering::Equal,
    });

    for (position, index) in ranked.into_iter().enumerate() {
        items[index].rank = Some(position + 1);
    }
}

/// Index of the highest value per metric. The earliest item wins a tie.
fn find_leaders(items: &[ComparisonItem]) -> MetricLeaders {
    let leader = |metric: fn(&AnalyticsResult) -> f64| -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, item) in items.iter().enumerate() {
            let Some(result) = &item.result else {
                continue;
            };
            let value = metric(result);
            if best.is_none_or(|(_, current)| value > current) {
                best = Some((index, value));
            }
        }
        best.map(|(index, _)| index)
    };

    MetricLeaders {
        views: leader(|r| r.metrics.views as f64),
        likes: leader(|r| r.metrics.likes as f64),
        comments: leader(|r| r.metrics.comments as f64),
        engagement_rate: leader(|r| r.metrics.engagement_rate),
    }
}
