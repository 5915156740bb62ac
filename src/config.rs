//! Process configuration from environment variables.
//!
//! Every variable is optional. Unparseable numbers fall back to their
//! defaults rather than aborting startup.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::aggregation::AnalyticsSettings;
use crate::cache::CacheSettings;
use crate::platform::{DEFAULT_SUPPORTED, Platform};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default credential database if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:clipsight.db?mode=rwc";

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_YOUTUBE_TTL_SECS: u64 = 3600;
const DEFAULT_INSTAGRAM_TTL_SECS: u64 = 1800;
const DEFAULT_CACHE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_MAX_COMMENTS: usize = 100;
const DEFAULT_MAX_COMPARE: usize = 5;
const DEFAULT_KEY_TEST_LIMIT: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub cache_url: Option<String>,
    pub cache_ttl: Duration,
    pub youtube_cache_ttl: Duration,
    pub instagram_cache_ttl: Duration,
    pub cache_timeout: Duration,
    pub youtube_api_key: Option<String>,
    pub instagram_access_token: Option<String>,
    pub supported_platforms: Vec<Platform>,
    pub max_comments: usize,
    pub max_compare: usize,
    pub key_test_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str, default: u64| parse_or(name, text(name), default);

        let supported_platforms = match text("CLIPSIGHT_SUPPORTED_PLATFORMS") {
            Some(list) => parse_platforms(&list),
            None => DEFAULT_SUPPORTED.to_vec(),
        };

        Self {
            port: parse_or("CLIPSIGHT_PORT", text("CLIPSIGHT_PORT"), DEFAULT_PORT),
            database_url: text("CLIPSIGHT_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            cache_url: text("CLIPSIGHT_CACHE_URL"),
            cache_ttl: Duration::from_secs(number(
                "CLIPSIGHT_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL_SECS,
            )),
            youtube_cache_ttl: Duration::from_secs(number(
                "CLIPSIGHT_YOUTUBE_CACHE_TTL_SECS",
                DEFAULT_YOUTUBE_TTL_SECS,
            )),
            instagram_cache_ttl: Duration::from_secs(number(
                "CLIPSIGHT_INSTAGRAM_CACHE_TTL_SECS",
                DEFAULT_INSTAGRAM_TTL_SECS,
            )),
            cache_timeout: Duration::from_millis(number(
                "CLIPSIGHT_CACHE_TIMEOUT_MS",
                DEFAULT_CACHE_TIMEOUT_MS,
            )),
            youtube_api_key: text("YOUTUBE_API_KEY"),
            instagram_access_token: text("INSTAGRAM_ACCESS_TOKEN"),
            supported_platforms,
            max_comments: parse_or(
                "CLIPSIGHT_MAX_COMMENTS",
                text("CLIPSIGHT_MAX_COMMENTS"),
                DEFAULT_MAX_COMMENTS,
            ),
            max_compare: parse_or(
                "CLIPSIGHT_MAX_COMPARE",
                text("CLIPSIGHT_MAX_COMPARE"),
                DEFAULT_MAX_COMPARE,
            ),
            key_test_limit: parse_or(
                "CLIPSIGHT_KEY_TEST_LIMIT",
                text("CLIPSIGHT_KEY_TEST_LIMIT"),
                DEFAULT_KEY_TEST_LIMIT,
            ),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            url: self.cache_url.clone(),
            default_ttl: self.cache_ttl,
            op_timeout: self.cache_timeout,
        }
    }

    pub fn analytics_settings(&self) -> AnalyticsSettings {
        AnalyticsSettings {
            default_ttl: self.cache_ttl,
            platform_ttls: HashMap::from([
                (Platform::Youtube, self.youtube_cache_ttl),
                (Platform::Instagram, self.instagram_cache_ttl),
            ]),
            key_test_limit: self.key_test_limit,
            ..AnalyticsSettings::default()
        }
    }

    /// System-wide credentials by platform.
    pub fn system_keys(&self) -> HashMap<Platform, String> {
        let mut keys = HashMap::new();
        if let Some(key) = &self.youtube_api_key {
            keys.insert(Platform::Youtube, key.clone());
        }
        if let Some(token) = &self.instagram_access_token {
            keys.insert(Platform::Instagram, token.clone());
        }
        keys
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Invalid number, using default");
            default
        }),
    }
}

fn parse_platforms(list: &str) -> Vec<Platform> {
    let mut platforms = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match name.parse::<Platform>() {
            Ok(platform) if !platforms.contains(&platform) => platforms.push(platform),
            Ok(_) => {}
            Err(_) => warn!(platform = name, "Ignoring unknown platform"),
        }
    }
    platforms
}
