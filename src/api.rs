//! HTTP API handlers for clipsight.
//!
//! The handlers are a thin boundary over [`AnalyticsAggregator`] and
//! [`ComparisonEngine`]. Authentication happens upstream: the caller's user
//! id arrives in the `x-user-id` header and is trusted as given.
//!
//! Every domain error renders as
//!
//! ```json
//! { "error": { "code": "INVALID_INPUT", "status": 400, "message": "...", "timestamp": "..." } }
//! ```
//!
//! with the HTTP status taken from the error's status hint.
//!
//! Credentials (`userKey`, `apiKey`) are never logged.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::aggregation::{AnalyticsAggregator, AnalyzeOptions, KeyTestResult, PlatformStatus};
use crate::comparison::{ComparisonEngine, ComparisonResult};
use crate::credentials::KeySourceReport;
use crate::error::{Error, ErrorKind, ErrorReport, Result};
use crate::metrics::GrowthReport;
use crate::model::AnalyticsResult;
use crate::platform::Platform;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Snapshots returned by `/history` when `days` is omitted.
const DEFAULT_HISTORY_DAYS: usize = 7;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<AnalyticsAggregator>,
    pub comparison: Arc<ComparisonEngine>,
}

impl AppState {
    pub fn new(aggregator: Arc<AnalyticsAggregator>, max_compare: usize) -> Self {
        let comparison = Arc::new(ComparisonEngine::new(aggregator.clone(), max_compare));
        Self {
            aggregator,
            comparison,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorReport,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(ErrorBody { error: self.report() })).into_response();

        if let ErrorKind::RateLimited { retry_after_secs } = self.kind() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }

        response
    }
}

/// The trimmed, non-empty `x-user-id` header value.
fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn log_failure(operation: &'static str, e: &Error) {
    if e.status() >= 500 {
        warn!(operation, code = e.code(), error = %e, "Request failed");
    } else {
        info!(operation, code = e.code(), error = %e, "Request rejected");
    }
}

/// Body of `POST /analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub options: AnalyzeOptions,
}

/// POST /analyze - Analyze one video.
///
/// # Request Body
///
/// ```json
/// {
///     "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
///     "skipCache": false,
///     "includeSentiment": true,
///     "includeKeywords": true
/// }
/// ```
///
/// Only `url` is required. `userKey` overrides the stored credential for
/// this request.
#[instrument(skip(state, headers, request), fields(url))]
pub async fn post_analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyticsResult>> {
    tracing::Span::current().record("url", request.url.as_str());

    let mut options = request.options;
    options.user_id = user_id(&headers);

    match state.aggregator.analyze(&request.url, &options).await {
        Ok(result) => {
            info!(
                platform = %result.video.platform,
                video_id = %result.video.id,
                from_cache = result.meta.from_cache,
                "Video analyzed"
            );
            Ok(Json(result))
        }
        Err(e) => {
            log_failure("analyze", &e);
            Err(e)
        }
    }
}

/// Body of `POST /compare`.
#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub options: AnalyzeOptions,
}

/// POST /compare - Analyze and rank several videos.
///
/// Individual failures are reported per item; the request itself only fails
/// for a batch outside the allowed size.
#[instrument(skip(state, headers, request), fields(urls))]
pub async fn post_compare(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CompareRequest>,
) -> Result<Json<ComparisonResult>> {
    tracing::Span::current().record("urls", request.urls.len());

    let mut options = request.options;
    options.user_id = user_id(&headers);

    state
        .comparison
        .compare(&request.urls, &options)
        .await
        .map(Json)
        .inspect_err(|e| log_failure("compare", e))
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub url: String,
    /// Number of most recent snapshots (default 7, at most 30).
    pub days: Option<usize>,
}

/// GET /history - Stored snapshots and growth for a video.
#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<GrowthReport>> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);

    match state.aggregator.history(&query.url, days).await {
        Ok(report) => {
            info!(
                video_id = %report.video_id,
                snapshots = report.snapshots.len(),
                "History queried"
            );
            Ok(Json(report))
        }
        Err(e) => {
            log_failure("history", &e);
            Err(e)
        }
    }
}

/// Query parameters for the key source endpoint.
#[derive(Debug, Deserialize)]
pub struct KeySourceQuery {
    #[serde(default)]
    pub platform: String,
}

/// GET /keys/source - Where the caller's credential for a platform would
/// come from.
#[instrument(skip(state, headers))]
pub async fn get_key_source(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeySourceQuery>,
) -> Result<Json<KeySourceReport>> {
    let platform = query
        .platform
        .parse::<Platform>()
        .inspect_err(|e| log_failure("key_source", e))?;
    let user = user_id(&headers);

    Ok(Json(
        state.aggregator.key_source(user.as_deref(), platform).await,
    ))
}

/// Body of `POST /keys/test`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyTestRequest {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub api_key: String,
}

/// POST /keys/test - Check a candidate credential against the platform.
///
/// A rejected key answers `200` with `"valid": false`. Too many attempts
/// answer `429` with a `Retry-After` header.
#[instrument(skip(state, headers, request), fields(platform))]
pub async fn post_key_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<KeyTestRequest>,
) -> Result<Json<KeyTestResult>> {
    // The candidate key stays out of the span
    tracing::Span::current().record("platform", request.platform.as_str());

    let platform = request
        .platform
        .parse::<Platform>()
        .inspect_err(|e| log_failure("key_test", e))?;
    let user = user_id(&headers);

    state
        .aggregator
        .test_credential(user.as_deref(), platform, &request.api_key)
        .await
        .map(Json)
        .inspect_err(|e| log_failure("key_test", e))
}

/// GET /platforms - Every detectable platform and whether the caller can
/// analyze it.
#[instrument(skip(state, headers))]
pub async fn get_platforms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<PlatformStatus>> {
    let user = user_id(&headers);
    Json(state.aggregator.platform_status(user.as_deref()).await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache_enabled: bool,
}

/// GET /health - Liveness plus whether the cache backend is attached.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cache_enabled: state.aggregator.cache().is_enabled(),
    })
}

/// Build the full router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(post_analyze))
        .route("/compare", post(post_compare))
        .route("/history", get(get_history))
        .route("/keys/source", get(get_key_source))
        .route("/keys/test", post(post_key_test))
        .route("/platforms", get(get_platforms))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
