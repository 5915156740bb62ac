//! YouTube Data API v3 client.
//!
//! A fetch costs three kinds of calls: `videos` for the video itself,
//! `channels` for its uploader and `commentThreads` (paged) for comments.
//! The key is passed as the `key` query parameter.
//!
//! # API Reference
//!
//! See: <https://developers.google.com/youtube/v3/docs>

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};
use url::Url;

use super::{HttpFailure, RawVideoData, VideoSource, get_json};
use crate::error::{Error, Result, UpstreamKind};
use crate::model::{Channel, Comment, RawCounts, Video};
use crate::platform::Platform;

/// Base URL for the YouTube Data API.
const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page `commentThreads` will return.
const MAX_PAGE_SIZE: usize = 100;

/// Public video used to check that a key works.
const PROBE_VIDEO_ID: &str = "dQw4w9WgXcQ";

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id pattern is valid"));

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("duration pattern is valid")
});

/// Client for the YouTube Data API.
#[derive(Clone)]
pub struct YouTubeClient {
    client: reqwest::Client,
    base_url: String,
    max_comments: usize,
}

impl YouTubeClient {
    /// Create a client that fetches at most `max_comments` comments per video.
    pub fn new(max_comments: usize) -> Self {
        Self::with_base_url(YOUTUBE_API_BASE, max_comments)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, max_comments: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_comments,
        }
    }

    async fn fetch_video(&self, video_id: &str, key: &str) -> Result<VideoItem> {
        let url = format!(
            "{}/videos?part=snippet,contentDetails,statistics&id={}&key={}",
            self.base_url,
            urlencoding::encode(video_id),
            urlencoding::encode(key)
        );

        let response: ListResponse<VideoItem> =
            get_json(&self.client, &url).await.map_err(classify)?;

        response.items.into_iter().next().ok_or_else(|| {
            Error::upstream(
                Platform::Youtube,
                UpstreamKind::NotFound,
                format!("video {} not found or private", video_id),
            )
        })
    }

    async fn fetch_channel(&self, channel_id: &str, key: &str) -> Result<Option<ChannelItem>> {
        let url = format!(
            "{}/channels?part=snippet,statistics&id={}&key={}",
            self.base_url,
            urlencoding::encode(channel_id),
            urlencoding::encode(key)
        );

        let response: ListResponse<ChannelItem> =
            get_json(&self.client, &url).await.map_err(classify)?;

        Ok(response.items.into_iter().next())
    }

    /// Top-level comments by relevance, paged up to the comment cap.
    async fn fetch_comments(&self, video_id: &str, key: &str) -> Result<Vec<Comment>> {
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;

        while comments.len() < self.max_comments {
            let page_size = (self.max_comments - comments.len()).min(MAX_PAGE_SIZE);
            let mut url = format!(
                "{}/commentThreads?part=snippet&videoId={}&maxResults={}&order=relevance&textFormat=plainText&key={}",
                self.base_url,
                urlencoding::encode(video_id),
                page_size,
                urlencoding::encode(key)
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let page: CommentThreadPage = match get_json(&self.client, &url).await {
                Ok(page) => page,
                Err(failure) if has_reason(&failure, "commentsDisabled") => {
                    debug!(video_id, "Comments disabled");
                    return Ok(Vec::new());
                }
                Err(failure) => return Err(classify(failure)),
            };

            comments.extend(page.items.into_iter().map(Comment::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        comments.truncate(self.max_comments);
        Ok(comments)
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn extract_id(&self, url: &str) -> Option<String> {
        extract_video_id(url)
    }

    async fn fetch(&self, url: &str, credential: &str) -> Result<RawVideoData> {
        let video_id = extract_video_id(url)
            .ok_or_else(|| Error::invalid_input(format!("no YouTube video id in {}", url)))?;

        let item = self.fetch_video(&video_id, credential).await?;
        let channel_item = self
            .fetch_channel(&item.snippet.channel_id, credential)
            .await?;
        let comments = self.fetch_comments(&video_id, credential).await?;

        info!(
            video_id = %video_id,
            comments = comments.len(),
            "Fetched YouTube video"
        );

        let statistics = item.statistics.unwrap_or_default();
        let counts = RawCounts {
            views: statistics.view_count.unwrap_or(0),
            likes: statistics.like_count.unwrap_or(0),
            comments: statistics.comment_count.unwrap_or(0),
            // Not exposed by the Data API
            shares: 0,
        };

        let snippet = item.snippet;
        let channel = match channel_item {
            Some(found) => found.into_channel(),
            None => Channel {
                platform: Platform::Youtube,
                id: snippet.channel_id.clone(),
                name: snippet.channel_title.clone(),
                subscriber_count: None,
                video_count: None,
                view_count: None,
                thumbnail: None,
            },
        };

        let video = Video {
            platform: Platform::Youtube,
            id: item.id,
            thumbnail: snippet.thumbnails.best(),
            title: snippet.title,
            description: snippet.description,
            published_at: snippet.published_at,
            duration: item
                .content_details
                .and_then(|details| details.duration)
                .and_then(|d| parse_duration(&d)),
            tags: snippet.tags,
            channel_id: snippet.channel_id,
            fetched_at: Utc::now(),
        };

        Ok(RawVideoData {
            video,
            channel,
            counts,
            comments,
        })
    }

    async fn validate_credential(&self, credential: &str) -> Result<()> {
        let url = format!(
            "{}/videos?part=id&id={}&key={}",
            self.base_url,
            PROBE_VIDEO_ID,
            urlencoding::encode(credential)
        );

        get_json::<ListResponse<IdOnly>>(&self.client, &url)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// Extract an 11-character video id from any common YouTube URL shape.
///
/// Accepts `watch?v=`, `youtu.be/`, `/embed/`, `/shorts/`, `/live/` and `/v/`,
/// with or without a scheme.
pub fn extract_video_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", raw)).ok())?;

    let host = parsed.host_str()?.to_lowercase();
    let host = host
        .trim_start_matches("www.")
        .trim_start_matches("m.")
        .trim_start_matches("music.");

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(name, _)| name == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed" | "shorts" | "live" | "v") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| VIDEO_ID.is_match(id))
}

/// Parse an ISO-8601 duration such as `PT1H2M3S` into seconds.
pub fn parse_duration(iso: &str) -> Option<u64> {
    let captures = ISO_DURATION.captures(iso)?;
    let part = |index: usize| -> u64 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    Some(part(1) * 86_400 + part(2) * 3_600 + part(3) * 60 + part(4))
}

fn has_reason(failure: &HttpFailure, reason: &str) -> bool {
    failure
        .envelope::<ErrorEnvelope>()
        .is_some_and(|envelope| envelope.error.errors.iter().any(|e| e.reason == reason))
}

/// Map a failed call onto the domain error taxonomy.
fn classify(failure: HttpFailure) -> Error {
    let envelope = failure.envelope::<ErrorEnvelope>();
    let reasons: Vec<String> = envelope
        .as_ref()
        .map(|e| e.error.errors.iter().map(|d| d.reason.clone()).collect())
        .unwrap_or_default();
    let message = envelope
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(failure.message);

    let has = |wanted: &[&str]| reasons.iter().any(|r| wanted.contains(&r.as_str()));

    let kind = if has(&["quotaExceeded", "rateLimitExceeded", "dailyLimitExceeded"]) {
        UpstreamKind::QuotaExceeded
    } else if has(&["keyInvalid", "keyExpired", "forbidden"])
        || failure.status == Some(StatusCode::UNAUTHORIZED)
        || (failure.status == Some(StatusCode::BAD_REQUEST) && message.contains("API key"))
    {
        UpstreamKind::InvalidCredential
    } else if has(&["videoNotFound", "notFound"]) || failure.status == Some(StatusCode::NOT_FOUND)
    {
        UpstreamKind::NotFound
    } else {
        UpstreamKind::Other
    };

    Error::upstream(Platform::Youtube, kind, message)
}

// API response types

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    #[serde(default)]
    content_details: Option<ContentDetails>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    maxres: Option<Thumbnail>,
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

impl Thumbnails {
    /// Largest available thumbnail.
    fn best(&self) -> Option<String> {
        [&self.maxres, &self.high, &self.medium, &self.default]
            .into_iter()
            .flatten()
            .map(|t| t.url.clone())
            .next()
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default, deserialize_with = "count")]
    view_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    like_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    comment_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: Option<ChannelStatistics>,
}

impl ChannelItem {
    fn into_channel(self) -> Channel {
        let statistics = self.statistics.unwrap_or_default();
        Channel {
            platform: Platform::Youtube,
            id: self.id,
            thumbnail: self.snippet.thumbnails.best(),
            name: self.snippet.title,
            subscriber_count: if statistics.hidden_subscriber_count {
                None
            } else {
                statistics.subscriber_count
            },
            video_count: statistics.video_count,
            view_count: statistics.view_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    #[serde(default, deserialize_with = "count")]
    subscriber_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    video_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    view_count: Option<u64>,
    #[serde(default)]
    hidden_subscriber_count: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadPage {
    #[serde(default)]
    items: Vec<CommentThread>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: ThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    author_display_name: String,
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    text_original: Option<String>,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

impl From<CommentThread> for Comment {
    fn from(thread: CommentThread) -> Self {
        let top = thread.snippet.top_level_comment;
        Comment {
            id: top.id,
            author: top.snippet.author_display_name,
            content: top.snippet.text_original.unwrap_or(top.snippet.text_display),
            like_count: top.snippet.like_count,
            published_at: top.snippet.published_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// YouTube reports counts as decimal strings.
fn count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.parse().ok(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sources::mock;
    use axum::extract::Query;
    use axum::http::StatusCode as HttpStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    const ID: &str = "abcDEF12345";

    fn video_body() -> Value {
        json!({
            "items": [{
                "id": ID,
                "snippet": {
                    "title": "Learning #rust in one hour",
                    "description": "Full course #rust #programming",
                    "publishedAt": "2024-05-01T12:00:00Z",
                    "channelId": "UC123",
                    "channelTitle": "Rustacean",
                    "tags": ["rust", "tutorial"],
                    "thumbnails": {
                        "default": { "url": "https://i.ytimg.com/default.jpg" },
                        "high": { "url": "https://i.ytimg.com/high.jpg" }
                    }
                },
                "contentDetails": { "duration": "PT1H2M3S" },
                "statistics": {
                    "viewCount": "10000",
                    "likeCount": "450",
                    "commentCount": "50"
                }
            }]
        })
    }

    async fn videos(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        match params.get("key").map(String::as_str) {
            Some("quota") => (
                HttpStatus::FORBIDDEN,
                Json(json!({
                    "error": {
                        "code": 403,
                        "message": "The request cannot be completed because you have exceeded your quota.",
                        "errors": [{ "reason": "quotaExceeded", "domain": "youtube.quota" }]
                    }
                })),
            ),
            Some("bad") => (
                HttpStatus::BAD_REQUEST,
                Json(json!({
                    "error": {
                        "code": 400,
                        "message": "API key not valid. Please pass a valid API key.",
                        "errors": [{ "reason": "badRequest" }]
                    }
                })),
            ),
            _ if params.get("id").map(String::as_str) == Some(ID)
                || params.get("id").map(String::as_str) == Some(PROBE_VIDEO_ID) =>
            {
                (HttpStatus::OK, Json(video_body()))
            }
            _ => (HttpStatus::OK, Json(json!({ "items": [] }))),
        }
    }

    async fn channels() -> Json<Value> {
        Json(json!({
            "items": [{
                "id": "UC123",
                "snippet": {
                    "title": "Rustacean",
                    "thumbnails": { "default": { "url": "https://yt3.ggpht.com/c.jpg" } }
                },
                "statistics": {
                    "subscriberCount": "1200",
                    "videoCount": "42",
                    "viewCount": "99000",
                    "hiddenSubscriberCount": false
                }
            }]
        }))
    }

    fn thread(id: usize, likes: u64) -> Value {
        json!({
            "snippet": {
                "topLevelComment": {
                    "id": format!("c{}", id),
                    "snippet": {
                        "authorDisplayName": format!("viewer{}", id),
                        "textDisplay": "great video",
                        "textOriginal": "great video",
                        "likeCount": likes,
                        "publishedAt": "2024-05-02T08:00:00Z"
                    }
                }
            }
        })
    }

    /// Two pages of three comments each.
    async fn comment_threads(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        match params.get("pageToken").map(String::as_str) {
            None => Json(json!({
                "items": [thread(1, 5), thread(2, 0), thread(3, 9)],
                "nextPageToken": "page-2"
            })),
            Some(_) => Json(json!({
                "items": [thread(4, 1), thread(5, 2), thread(6, 3)]
            })),
        }
    }

    async fn comments_disabled() -> impl IntoResponse {
        (
            HttpStatus::FORBIDDEN,
            Json(json!({
                "error": {
                    "code": 403,
                    "message": "The video has disabled comments.",
                    "errors": [{ "reason": "commentsDisabled" }]
                }
            })),
        )
    }

    async fn client(max_comments: usize, comments_enabled: bool) -> YouTubeClient {
        let router = Router::new()
            .route("/videos", get(videos))
            .route("/channels", get(channels));
        let router = if comments_enabled {
            router.route("/commentThreads", get(comment_threads))
        } else {
            router.route("/commentThreads", get(comments_disabled))
        };
        let base = mock::serve(router).await;
        YouTubeClient::with_base_url(&base, max_comments)
    }

    #[test]
    fn test_extract_video_id_from_url_shapes() {
        let urls = [
            "https://www.youtube.com/watch?v=abcDEF12345",
            "https://youtube.com/watch?feature=share&v=abcDEF12345",
            "https://m.youtube.com/watch?v=abcDEF12345&t=42s",
            "https://youtu.be/abcDEF12345?si=xyz",
            "youtu.be/abcDEF12345",
            "https://www.youtube.com/embed/abcDEF12345",
            "https://www.youtube.com/shorts/abcDEF12345",
            "https://www.youtube.com/live/abcDEF12345",
            "https://www.youtube.com/v/abcDEF12345",
            "HTTPS://WWW.YOUTUBE.COM/watch?v=abcDEF12345",
        ];

        for url in urls {
            assert_eq!(extract_video_id(url).as_deref(), Some(ID), "{}", url);
        }
    }

    #[test]
    fn test_extract_video_id_rejects_invalid() {
        assert!(extract_video_id("https://www.youtube.com/watch?v=short").is_none());
        assert!(extract_video_id("https://www.youtube.com/channel/UC123").is_none());
        assert!(extract_video_id("https://vimeo.com/abcDEF12345").is_none());
        assert!(extract_video_id("").is_none());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT1H2M3S"), Some(3_723));
        assert_eq!(parse_duration("PT45S"), Some(45));
        assert_eq!(parse_duration("PT10M"), Some(600));
        assert_eq!(parse_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_duration("P0D"), Some(0));
        assert_eq!(parse_duration("1:02:03"), None);
    }

    #[tokio::test]
    async fn test_fetch_assembles_video() {
        let client = client(100, true).await;

        let data = client
            .fetch("https://youtu.be/abcDEF12345", "good")
            .await
            .unwrap();

        assert_eq!(data.video.id, ID);
        assert_eq!(data.video.platform, Platform::Youtube);
        assert_eq!(data.video.duration, Some(3_723));
        assert_eq!(
            data.video.thumbnail.as_deref(),
            Some("https://i.ytimg.com/high.jpg")
        );
        assert_eq!(data.video.tags, vec!["rust", "tutorial"]);
        assert_eq!(data.channel.name, "Rustacean");
        assert_eq!(data.channel.subscriber_count, Some(1_200));
        assert_eq!(
            data.counts,
            RawCounts {
                views: 10_000,
                likes: 450,
                comments: 50,
                shares: 0
            }
        );
        assert_eq!(data.comments.len(), 6);
        assert_eq!(data.comments[2].like_count, 9);
    }

    #[tokio::test]
    async fn test_comments_capped() {
        let client = client(4, true).await;

        let data = client
            .fetch("https://www.youtube.com/watch?v=abcDEF12345", "good")
            .await
            .unwrap();

        assert_eq!(data.comments.len(), 4);
    }

    #[tokio::test]
    async fn test_comments_disabled_yields_empty_set() {
        let client = client(100, false).await;

        let data = client
            .fetch("https://www.youtube.com/watch?v=abcDEF12345", "good")
            .await
            .unwrap();

        assert!(data.comments.is_empty());
        assert_eq!(data.counts.views, 10_000);
    }

    #[tokio::test]
    async fn test_fetch_error_kinds() {
        let client = client(10, true).await;

        let err = client
            .fetch("https://youtu.be/abcDEF12345", "quota")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "QUOTA_EXCEEDED");

        let err = client
            .fetch("https://youtu.be/abcDEF12345", "bad")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_API_KEY");

        let err = client
            .fetch("https://youtu.be/zzzzzzzzzzz", "good")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VIDEO_NOT_FOUND");

        let err = client
            .fetch("https://www.youtube.com/feed/trending", "good")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_validate_credential() {
        let client = client(10, true).await;

        assert!(client.validate_credential("good").await.is_ok());
        assert_eq!(
            client.validate_credential("bad").await.unwrap_err().code(),
            "INVALID_API_KEY"
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_upstream_error() {
        let client = YouTubeClient::with_base_url("http://127.0.0.1:1", 10);

        let err = client
            .fetch("https://youtu.be/abcDEF12345", "good")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UPSTREAM_ERROR");
    }
}
