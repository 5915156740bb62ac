//! Platform detection.
//!
//! A URL is mapped to a platform by case-insensitive substring match against
//! an ordered list of domain markers; the first marker found wins. Detection
//! is wider than support: TikTok and Vimeo are recognised so callers can say
//! "detected but unsupported" instead of "unknown".

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A video host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
    Vimeo,
}

/// Ordered domain markers. Order matters: first match wins.
const DOMAIN_MARKERS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("instagram.com", Platform::Instagram),
    ("tiktok.com", Platform::Tiktok),
    ("vimeo.com", Platform::Vimeo),
];

/// Platforms supported when no configuration says otherwise.
pub const DEFAULT_SUPPORTED: &[Platform] = &[Platform::Youtube, Platform::Instagram];

impl Platform {
    /// Every detectable platform.
    pub const ALL: [Platform; 4] = [
        Platform::Youtube,
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Vimeo,
    ];

    /// Upper-case identifier, e.g. `YOUTUBE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "YOUTUBE",
            Platform::Instagram => "INSTAGRAM",
            Platform::Tiktok => "TIKTOK",
            Platform::Vimeo => "VIMEO",
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Youtube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::Tiktok => "TikTok",
            Platform::Vimeo => "Vimeo",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::unsupported_platform(format!("unknown platform '{}'", wanted)))
    }
}

/// Detect which platform a URL belongs to.
///
/// Returns `Ok(None)` for URLs that match no known host and
/// `InvalidInput` for an empty URL.
pub fn detect_platform(url: &str) -> Result<Option<Platform>> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::invalid_input("url is required"));
    }

    let lowered = url.to_lowercase();
    Ok(DOMAIN_MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, platform)| *platform))
}

/// Maps URLs to platforms and checks them against the supported set.
#[derive(Debug, Clone)]
pub struct PlatformResolver {
    supported: HashSet<Platform>,
}

impl Default for PlatformResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED.iter().copied())
    }
}

impl PlatformResolver {
    pub fn new(supported: impl IntoIterator<Item = Platform>) -> Self {
        Self {
            supported: supported.into_iter().collect(),
        }
    }

    pub fn detect(&self, url: &str) -> Result<Option<Platform>> {
        detect_platform(url)
    }

    /// Detect the platform and require it to be supported.
    pub fn resolve(&self, url: &str) -> Result<Platform> {
        match self.detect(url)? {
            Some(platform) if self.is_supported(platform) => Ok(platform),
            Some(platform) => Err(Error::unsupported_platform(format!(
                "{} was detected but is not supported",
                platform
            ))),
            None => Err(Error::unsupported_platform(format!(
                "no supported platform recognised in '{}'",
                url.trim()
            ))),
        }
    }

    pub fn is_supported(&self, platform: Platform) -> bool {
        self.supported.contains(&platform)
    }

    /// Supported platforms in a stable order.
    pub fn supported(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.supported.iter().copied().collect();
        platforms.sort();
        platforms
    }
}
