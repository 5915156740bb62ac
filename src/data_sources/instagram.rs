//! Instagram Graph API client.
//!
//! Instagram URLs carry a shortcode, not a media id. A fetch first resolves
//! the permalink through `instagram_oembed`, then reads the media node and
//! its `comments` edge.
//!
//! # API Reference
//!
//! See: <https://developers.facebook.com/docs/instagram-api>

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::info;
use url::Url;

use super::{HttpFailure, RawVideoData, VideoSource, get_json};
use crate::error::{Error, Result, UpstreamKind};
use crate::model::{Channel, Comment, RawCounts, Video};
use crate::platform::Platform;

/// Base URL for the Graph API.
const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Largest page the `comments` edge will return.
const MAX_PAGE_SIZE: usize = 50;

/// Titles are the caption's first line, cut to this many characters.
const TITLE_CHARS: usize = 100;

const MEDIA_FIELDS: &str = "id,caption,media_type,media_url,thumbnail_url,permalink,timestamp,\
like_count,comments_count,play_count,username,owner{id,username,followers_count,media_count,profile_picture_url}";

static SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("shortcode pattern is valid"));

/// Client for the Instagram Graph API.
#[derive(Clone)]
pub struct InstagramClient {
    client: reqwest::Client,
    base_url: String,
    max_comments: usize,
}

impl InstagramClient {
    /// Create a client that fetches at most `max_comments` comments per post.
    pub fn new(max_comments: usize) -> Self {
        Self::with_base_url(GRAPH_API_BASE, max_comments)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, max_comments: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_comments,
        }
    }

    async fn resolve_media_id(&self, shortcode: &str, token: &str) -> Result<OEmbed> {
        let permalink = format!("https://www.instagram.com/p/{}/", shortcode);
        let url = format!(
            "{}/instagram_oembed?url={}&access_token={}",
            self.base_url,
            urlencoding::encode(&permalink),
            urlencoding::encode(token)
        );

        get_json(&self.client, &url).await.map_err(classify)
    }

    async fn fetch_media(&self, media_id: &str, token: &str) -> Result<MediaNode> {
        let url = format!(
            "{}/{}?fields={}&access_token={}",
            self.base_url,
            urlencoding::encode(media_id),
            urlencoding::encode(MEDIA_FIELDS),
            urlencoding::encode(token)
        );

        get_json(&self.client, &url).await.map_err(classify)
    }

    /// Comments on the media node, following `after` cursors up to the cap.
    async fn fetch_comments(&self, media_id: &str, token: &str) -> Result<Vec<Comment>> {
        let mut comments = Vec::new();
        let mut after: Option<String> = None;

        while comments.len() < self.max_comments {
            let limit = (self.max_comments - comments.len()).min(MAX_PAGE_SIZE);
            let mut url = format!(
                "{}/{}/comments?fields=id,text,username,like_count,timestamp&limit={}&access_token={}",
                self.base_url,
                urlencoding::encode(media_id),
                limit,
                urlencoding::encode(token)
            );
            if let Some(cursor) = &after {
                url.push_str(&format!("&after={}", urlencoding::encode(cursor)));
            }

            let page: CommentPage = get_json(&self.client, &url).await.map_err(classify)?;
            comments.extend(page.data.into_iter().map(Comment::from));

            match page.paging.and_then(|p| p.next_cursor()) {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        comments.truncate(self.max_comments);
        Ok(comments)
    }
}

#[async_trait]
impl VideoSource for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn extract_id(&self, url: &str) -> Option<String> {
        extract_shortcode(url)
    }

    async fn fetch(&self, url: &str, credential: &str) -> Result<RawVideoData> {
        let shortcode = extract_shortcode(url)
            .ok_or_else(|| Error::invalid_input(format!("no Instagram shortcode in {}", url)))?;

        let oembed = self.resolve_media_id(&shortcode, credential).await?;
        let media_id = oembed.media_id.clone().ok_or_else(|| {
            Error::upstream(
                Platform::Instagram,
                UpstreamKind::NotFound,
                format!("post {} not found or private", shortcode),
            )
        })?;

        let media = self.fetch_media(&media_id, credential).await?;
        let comments = self.fetch_comments(&media_id, credential).await?;

        info!(
            shortcode = %shortcode,
            comments = comments.len(),
            "Fetched Instagram media"
        );

        let counts = RawCounts {
            views: media.play_count.or(media.video_views).unwrap_or(0),
            likes: media.like_count.unwrap_or(0),
            comments: media.comments_count.unwrap_or(0),
            shares: 0,
        };

        let owner = media.owner.clone().unwrap_or_default();
        let username = owner
            .username
            .clone()
            .or_else(|| media.username.clone())
            .or_else(|| oembed.author_name.clone())
            .unwrap_or_default();
        let channel = Channel {
            platform: Platform::Instagram,
            id: owner.id.clone().unwrap_or_else(|| username.clone()),
            name: username,
            subscriber_count: owner.followers_count,
            video_count: owner.media_count,
            view_count: None,
            thumbnail: owner.profile_picture_url,
        };

        let caption = media.caption.unwrap_or_default();
        let video = Video {
            platform: Platform::Instagram,
            id: shortcode,
            title: title_from_caption(&caption),
            description: caption,
            thumbnail: media
                .thumbnail_url
                .or(media.media_url)
                .or(oembed.thumbnail_url),
            published_at: media.timestamp.as_deref().and_then(parse_timestamp),
            duration: None,
            tags: Vec::new(),
            channel_id: channel.id.clone(),
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
            "{}/me?fields=id&access_token={}",
            self.base_url,
            urlencoding::encode(credential)
        );

        get_json::<serde_json::Value>(&self.client, &url)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// Extract the shortcode from a post, reel or IGTV URL.
pub fn extract_shortcode(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", raw)).ok())?;

    let host = parsed.host_str()?.to_lowercase();
    if host != "instagram.com" && !host.ends_with(".instagram.com") {
        return None;
    }

    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    // Profile-scoped links look like /<user>/reel/<code>/
    let position = segments
        .iter()
        .position(|s| matches!(*s, "p" | "reel" | "reels" | "tv"))?;

    segments
        .get(position + 1)
        .filter(|code| SHORTCODE.is_match(code))
        .map(|code| code.to_string())
}

/// First caption line, cut to a title-sized prefix.
fn title_from_caption(caption: &str) -> String {
    let first_line = caption.lines().next().unwrap_or_default().trim();
    let mut title: String = first_line.chars().take(TITLE_CHARS).collect();
    if first_line.chars().count() > TITLE_CHARS {
        title.push('…');
    }
    title
}

/// Graph timestamps look like `2024-05-01T12:00:00+0000`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Map a failed call onto the domain error taxonomy using Graph error codes.
fn classify(failure: HttpFailure) -> Error {
    let envelope = failure.envelope::<ErrorEnvelope>();
    let code = envelope.as_ref().and_then(|e| e.error.code);
    let message = envelope
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or(failure.message);

    let kind = match code {
        Some(190) => UpstreamKind::InvalidCredential,
        Some(4 | 17 | 32 | 613) => UpstreamKind::QuotaExceeded,
        Some(24 | 100 | 803) => UpstreamKind::NotFound,
        _ if failure.status == Some(StatusCode::NOT_FOUND) => UpstreamKind::NotFound,
        _ if failure.status == Some(StatusCode::UNAUTHORIZED) => UpstreamKind::InvalidCredential,
        _ => UpstreamKind::Other,
    };

    Error::upstream(Platform::Instagram, kind, message)
}

// API response types

#[derive(Debug, Deserialize)]
struct OEmbed {
    media_id: Option<String>,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    caption: Option<String>,
    media_url: Option<String>,
    thumbnail_url: Option<String>,
    timestamp: Option<String>,
    like_count: Option<u64>,
    comments_count: Option<u64>,
    play_count: Option<u64>,
    video_views: Option<u64>,
    username: Option<String>,
    owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Owner {
    id: Option<String>,
    username: Option<String>,
    followers_count: Option<u64>,
    media_count: Option<u64>,
    profile_picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    data: Vec<GraphComment>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    cursors: Option<Cursors>,
    next: Option<String>,
}

impl Paging {
    /// The `after` cursor, only when another page exists.
    fn next_cursor(self) -> Option<String> {
        self.next?;
        self.cursors?.after
    }
}

#[derive(Debug, Deserialize)]
struct Cursors {
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphComment {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    like_count: u64,
    timestamp: Option<String>,
}

impl From<GraphComment> for Comment {
    fn from(comment: GraphComment) -> Self {
        Comment {
            id: comment.id,
            author: comment.username,
            content: comment.text,
            like_count: comment.like_count,
            published_at: comment.timestamp.as_deref().and_then(parse_timestamp),
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
    code: Option<u32>,
}
