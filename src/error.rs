//! Error types for clipsight.
//!
//! Domain errors form a closed set of kinds. Each one carries a stable
//! machine-readable code, an HTTP status hint and the time it was raised so
//! that every boundary can translate it the same way.
//!
//! Cache failures have their own type, [`CacheError`], which never leaves the
//! cache layer: it is logged and the operation degrades to a miss or no-op.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Platform;

/// What a platform API reported when a fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpstreamKind {
    /// Daily quota or request rate exhausted.
    QuotaExceeded,
    /// The video (or its media node) does not exist or is private.
    NotFound,
    /// The credential was rejected.
    InvalidCredential,
    /// Transport failure, unexpected status or unreadable payload.
    Other,
}

/// The closed set of domain error kinds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    /// Malformed or missing input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// URL not recognised, or recognised but not in the supported set.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// No credential is resolvable for the platform.
    #[error("{0} is not configured; connect an API key for this platform")]
    ServiceNotConfigured(Platform),

    /// The platform API reported an error.
    #[error("{platform} API error: {message}")]
    Upstream {
        platform: Platform,
        kind: UpstreamKind,
        message: String,
    },

    /// Too many attempts inside the current window.
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// A domain error together with the time it was raised.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    timestamp: DateTime<Utc>,
}

/// Convenience Result type using the clipsight [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput(message.into()))
    }

    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedPlatform(message.into()))
    }

    pub fn service_not_configured(platform: Platform) -> Self {
        Self::new(ErrorKind::ServiceNotConfigured(platform))
    }

    pub fn upstream(platform: Platform, kind: UpstreamKind, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream {
            platform,
            kind,
            message: message.into(),
        })
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(ErrorKind::RateLimited { retry_after_secs })
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match &self.kind {
            ErrorKind::InvalidInput(_) => "INVALID_INPUT",
            ErrorKind::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            ErrorKind::ServiceNotConfigured(_) => "SERVICE_NOT_CONFIGURED",
            ErrorKind::Upstream { kind, .. } => match kind {
                UpstreamKind::QuotaExceeded => "QUOTA_EXCEEDED",
                UpstreamKind::NotFound => "VIDEO_NOT_FOUND",
                UpstreamKind::InvalidCredential => "INVALID_API_KEY",
                UpstreamKind::Other => "UPSTREAM_ERROR",
            },
            ErrorKind::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    /// HTTP status hint for the boundary.
    pub fn status(&self) -> u16 {
        match &self.kind {
            ErrorKind::InvalidInput(_) | ErrorKind::UnsupportedPlatform(_) => 400,
            ErrorKind::ServiceNotConfigured(_) => 503,
            ErrorKind::Upstream { kind, .. } => match kind {
                UpstreamKind::QuotaExceeded => 429,
                UpstreamKind::NotFound => 404,
                UpstreamKind::InvalidCredential => 401,
                UpstreamKind::Other => 502,
            },
            ErrorKind::RateLimited { .. } => 429,
        }
    }

    /// Serialisable form used in responses and per-item comparison failures.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            status: self.status(),
            message: self.kind.to_string(),
            timestamp: self.timestamp,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Wire shape of a domain error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: String,
    pub status: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A failed cache operation. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (Error::invalid_input("empty url"), "INVALID_INPUT", 400),
            (
                Error::unsupported_platform("tiktok"),
                "UNSUPPORTED_PLATFORM",
                400,
            ),
            (
                Error::service_not_configured(Platform::Youtube),
                "SERVICE_NOT_CONFIGURED",
                503,
            ),
            (
                Error::upstream(Platform::Youtube, UpstreamKind::QuotaExceeded, "quota"),
                "QUOTA_EXCEEDED",
                429,
            ),
            (
                Error::upstream(Platform::Instagram, UpstreamKind::NotFound, "gone"),
                "VIDEO_NOT_FOUND",
                404,
            ),
            (
                Error::upstream(Platform::Youtube, UpstreamKind::InvalidCredential, "bad key"),
                "INVALID_API_KEY",
                401,
            ),
            (
                Error::upstream(Platform::Youtube, UpstreamKind::Other, "boom"),
                "UPSTREAM_ERROR",
                502,
            ),
            (Error::rate_limited(30), "RATE_LIMITED", 429),
        ];

        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn test_report_carries_timestamp_and_message() {
        let error = Error::service_not_configured(Platform::Instagram);
        let report = error.report();

        assert_eq!(report.code, "SERVICE_NOT_CONFIGURED");
        assert_eq!(report.status, 503);
        assert_eq!(report.timestamp, error.timestamp());
        assert!(report.message.contains("Instagram"));
    }

    #[test]
    fn test_kind_is_matchable() {
        let error = Error::unsupported_platform("https://vimeo.com/1");
        assert!(matches!(error.kind(), ErrorKind::UnsupportedPlatform(_)));
    }
}
