//! Keyword and hashtag signals from a video's own text.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default number of keywords and hashtags reported.
pub const DEFAULT_LIMIT: usize = 10;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"));

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([\p{L}\p{N}_]+)").expect("hashtag pattern is valid"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "about", "after", "again", "all", "also", "and", "any", "are", "because", "been",
        "before", "being", "but", "can", "could", "did", "does", "doing", "down", "each", "for",
        "from", "get", "got", "had", "has", "have", "her", "here", "him", "his", "how", "http",
        "https", "into", "its", "just", "more", "most", "much", "new", "not", "now", "off",
        "once", "only", "other", "our", "out", "over", "own", "same", "she", "should", "some",
        "such", "than", "that", "the", "their", "them", "then", "there", "these", "they",
        "this", "those", "through", "too", "under", "until", "very", "was", "way", "were",
        "what", "when", "where", "which", "while", "who", "why", "will", "with", "www",
        "would", "you", "your", "com", "video", "videos", "watch", "subscribe", "channel",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    /// Frequency relative to the most frequent keyword, in `(0, 1]`.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashtag {
    /// Lowercased, including the leading `#`.
    pub hashtag: String,
    pub count: usize,
}

fn is_candidate(token: &str) -> bool {
    token.chars().count() >= 3
        && !token.chars().all(|c| c.is_numeric())
        && !STOP_WORDS.contains(token)
}

/// Rank the most frequent meaningful words across `texts`.
///
/// Tags are counted twice since the uploader chose them as keywords.
pub fn extract_keywords(texts: &[&str], tags: &[String], limit: usize) -> Vec<Keyword> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    let mut count_text = |text: &str, weight: usize| {
        let lowered = text.to_lowercase();
        for token in WORD.find_iter(&lowered).map(|m| m.as_str()) {
            if is_candidate(token) {
                *counts.entry(token.to_string()).or_insert(0) += weight;
            }
        }
    };

    for text in texts {
        // Hashtags are reported on their own.
        count_text(HASHTAG.replace_all(text, " ").as_ref(), 1);
    }
    for tag in tags {
        count_text(tag, 2);
    }

    let Some(max) = counts.values().copied().max() else {
        return Vec::new();
    };

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(keyword, count)| Keyword {
            keyword,
            score: (count as f64 / max as f64 * 100.0).round() / 100.0,
        })
        .collect()
}

/// Count `#hashtag` occurrences across `texts`, most frequent first.
pub fn extract_hashtags(texts: &[&str], limit: usize) -> Vec<Hashtag> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for text in texts {
        for capture in HASHTAG.captures_iter(text) {
            let tag = format!("#{}", capture[1].to_lowercase());
            *counts.entry(tag).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<Hashtag> = counts
        .into_iter()
        .map(|(hashtag, count)| Hashtag { hashtag, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.hashtag.cmp(&b.hashtag)));
    ranked.truncate(limit);
    ranked
}
