//! Lexical comment sentiment.
//!
//! Each comment gets a signed score from a weighted word list, normalised by
//! its token count and clamped to `[-1, 1]`, then a label via a ±0.1
//! threshold. The aggregate weights every comment by `1 + ln(1 + likes)` so
//! heavily-liked comments pull the overall score harder than a plain mean
//! would, while the distribution counts every comment once.

mod lexicon;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::metrics::round4;
use crate::model::{AnalyzedComment, Comment};

/// Scores strictly above this are positive, strictly below its negation negative.
pub const LABEL_THRESHOLD: f64 = 0.1;

/// Share (percent) at which one bucket is considered overwhelming.
pub const OVERWHELMING_PERCENT: u32 = 70;

/// Inclusive percent range in which positive and negative both sit for a mixed reception.
pub const MIXED_RANGE: (u32, u32) = (20, 45);

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9']+").expect("token pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Label a signed score with the ±0.1 threshold.
    pub fn from_score(score: f64) -> Self {
        if score > LABEL_THRESHOLD {
            SentimentLabel::Positive
        } else if score < -LABEL_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Integer percentages per bucket. Rounded independently, so the sum may be
/// off 100 by one or two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: u32,
    pub neutral: u32,
    pub negative: u32,
}

impl SentimentDistribution {
    fn from_counts(positive: usize, neutral: usize, negative: usize) -> Self {
        let total = positive + neutral + negative;
        if total == 0 {
            return Self {
                positive: 0,
                neutral: 100,
                negative: 0,
            };
        }
        let percent = |count: usize| (count as f64 * 100.0 / total as f64).round() as u32;
        Self {
            positive: percent(positive),
            neutral: percent(neutral),
            negative: percent(negative),
        }
    }

    /// Bucket with the highest share; ties go to positive, then negative.
    pub fn leading_label(&self) -> SentimentLabel {
        if self.positive >= self.negative && self.positive >= self.neutral {
            SentimentLabel::Positive
        } else if self.negative >= self.neutral {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Aggregate sentiment over a set of analysed comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysis {
    /// Like-weighted mean score, rounded to 4 decimals.
    pub score: f64,
    pub label: SentimentLabel,
    pub distribution: SentimentDistribution,
    pub total_analyzed: usize,
}

impl SentimentAnalysis {
    /// The canonical result for an empty comment set.
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            label: SentimentLabel::Neutral,
            distribution: SentimentDistribution::from_counts(0, 0, 0),
            total_analyzed: 0,
        }
    }

    /// The bucket holding at least 70% of comments, if any.
    pub fn overwhelming(&self) -> Option<SentimentLabel> {
        if self.total_analyzed == 0 {
            return None;
        }
        let d = &self.distribution;
        [
            (SentimentLabel::Positive, d.positive),
            (SentimentLabel::Negative, d.negative),
            (SentimentLabel::Neutral, d.neutral),
        ]
        .into_iter()
        .find(|(_, percent)| *percent >= OVERWHELMING_PERCENT)
        .map(|(label, _)| label)
    }

    /// Positive and negative both within 20..=45 percent.
    pub fn is_mixed(&self) -> bool {
        let (low, high) = MIXED_RANGE;
        let in_range = |p: u32| (low..=high).contains(&p);
        self.total_analyzed > 0
            && in_range(self.distribution.positive)
            && in_range(self.distribution.negative)
    }
}

/// Word-list sentiment scorer.
#[derive(Debug, Clone)]
pub struct SentimentEngine {
    weights: HashMap<&'static str, i32>,
    negators: HashSet<&'static str>,
}

impl Default for SentimentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentEngine {
    pub fn new() -> Self {
        Self {
            weights: lexicon::POSITIVE
                .iter()
                .chain(lexicon::NEGATIVE.iter())
                .copied()
                .collect(),
            negators: lexicon::NEGATORS.iter().copied().collect(),
        }
    }

    /// Signed score of a text in `[-1, 1]`.
    pub fn score_text(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase().replace('\u{2019}', "'");
        let tokens: Vec<&str> = TOKEN.find_iter(&lowered).map(|m| m.as_str()).collect();
        if tokens.is_empty() {
            return 0.0;
        }

        let mut total = 0i32;
        for (i, token) in tokens.iter().enumerate() {
            let Some(weight) = self.weights.get(*token) else {
                continue;
            };
            let negated = i > 0 && self.negators.contains(tokens[i - 1]);
            total += if negated { -weight } else { *weight };
        }

        (f64::from(total) / tokens.len() as f64).clamp(-1.0, 1.0)
    }

    pub fn analyze_comment(&self, comment: &Comment) -> AnalyzedComment {
        let score = round4(self.score_text(&comment.content));
        AnalyzedComment::scored(comment.clone(), score, SentimentLabel::from_score(score))
    }

    pub fn analyze_comments(&self, comments: &[Comment]) -> Vec<AnalyzedComment> {
        comments.iter().map(|c| self.analyze_comment(c)).collect()
    }

    /// Aggregate already-analysed comments. Unscored comments are skipped.
    pub fn summarize(&self, analyzed: &[AnalyzedComment]) -> SentimentAnalysis {
        let mut counts = (0usize, 0usize, 0usize);
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for item in analyzed {
            let (Some(score), Some(label)) = (item.sentiment_score, item.sentiment_label) else {
                continue;
            };
            match label {
                SentimentLabel::Positive => counts.0 += 1,
                SentimentLabel::Neutral => counts.1 += 1,
                SentimentLabel::Negative => counts.2 += 1,
            }
            let weight = 1.0 + (item.comment.like_count as f64).ln_1p();
            weighted_sum += score * weight;
            weight_total += weight;
        }

        let total = counts.0 + counts.1 + counts.2;
        if total == 0 {
            return SentimentAnalysis::neutral();
        }

        let distribution = SentimentDistribution::from_counts(counts.0, counts.1, counts.2);
        SentimentAnalysis {
            score: round4(weighted_sum / weight_total),
            label: distribution.leading_label(),
            distribution,
            total_analyzed: total,
        }
    }

    pub fn analyze(&self, comments: &[Comment]) -> SentimentAnalysis {
        self.summarize(&self.analyze_comments(comments))
    }
}
