//! Platform video sources.
//!
//! Each supported platform has one client implementing [`VideoSource`]. The
//! aggregator looks clients up by [`Platform`] in a [`SourceRegistry`] and
//! never branches on the platform itself.
//!
//! # Data Sources
//!
//! - [`youtube`]: YouTube Data API v3
//! - [`instagram`]: Instagram Graph API
//!
//! Sources only see a URL and a credential. They never touch the cache,
//! snapshot history or user identity.

pub mod instagram;
pub mod youtube;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::model::{Channel, Comment, RawCounts, Video};
use crate::platform::Platform;

pub use instagram::InstagramClient;
pub use youtube::YouTubeClient;

/// Everything one fetch returns, before any analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideoData {
    pub video: Video,
    pub channel: Channel,
    pub counts: RawCounts,
    /// Bounded by the source's comment cap.
    pub comments: Vec<Comment>,
}

/// Fetch capability for one platform.
#[async_trait]
pub trait VideoSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Platform-specific video id in `url`, if it has one.
    fn extract_id(&self, url: &str) -> Option<String>;

    /// Fetch video, channel, counts and comments using `credential`.
    async fn fetch(&self, url: &str, credential: &str) -> Result<RawVideoData>;

    /// Make the cheapest authenticated call that proves `credential` works.
    async fn validate_credential(&self, credential: &str) -> Result<()>;

    /// Whether the source is operational apart from credentials.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Platform-keyed lookup of video sources.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<Platform, Arc<dyn VideoSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own platform, replacing any previous one.
    pub fn register(mut self, source: Arc<dyn VideoSource>) -> Self {
        self.sources.insert(source.platform(), source);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn VideoSource>> {
        self.sources.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.sources.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

/// A failed upstream call, before platform-specific classification.
#[derive(Debug)]
pub(crate) struct HttpFailure {
    pub status: Option<StatusCode>,
    /// Parsed response body, when there was one.
    pub body: Option<serde_json::Value>,
    pub message: String,
}

impl HttpFailure {
    fn transport(error: reqwest::Error) -> Self {
        Self {
            status: error.status(),
            body: None,
            message: error.to_string(),
        }
    }

    /// Decode the body as a platform error envelope.
    pub fn envelope<E: DeserializeOwned>(&self) -> Option<E> {
        self.body
            .clone()
            .and_then(|body| serde_json::from_value(body).ok())
    }
}

/// GET `url` and decode the JSON body as `T`.
///
/// Non-2xx statuses and bodies carrying a top-level `error` object are both
/// failures; the body is kept so the caller can classify it.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> std::result::Result<T, HttpFailure> {
    let response = client.get(url).send().await.map_err(HttpFailure::transport)?;
    let status = response.status();
    let text = response.text().await.map_err(HttpFailure::transport)?;
    let body = serde_json::from_str::<serde_json::Value>(&text).ok();

    let has_error = body.as_ref().is_some_and(|b| b.get("error").is_some());
    if !status.is_success() || has_error {
        return Err(HttpFailure {
            status: Some(status),
            body,
            message: format!("HTTP {}", status),
        });
    }

    let Some(body) = body else {
        return Err(HttpFailure {
            status: Some(status),
            body: None,
            message: "response was not JSON".to_string(),
        });
    };

    serde_json::from_value(body).map_err(|e| HttpFailure {
        status: Some(status),
        body: None,
        message: format!("unexpected response shape: {}", e),
    })
}

/// Local stand-in for upstream APIs.
#[cfg(test)]
pub(crate) mod mock {
    use axum::Router;

    /// Serve `router` on an ephemeral port and return its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
