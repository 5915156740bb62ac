//! Clipsight - video analytics retrieval with caching, history and comparison.
//!
//! # Overview
//!
//! Given a video URL, clipsight detects the hosting platform, picks a
//! credential, fetches video, channel, counts and comments from the platform
//! API, and assembles an analytics result: derived metrics, comment
//! sentiment, keywords and hashtags. Results are cached with a per-platform
//! TTL and every fresh fetch appends a snapshot to a bounded per-video
//! history.
//!
//! The cache is optional. When it is missing, slow or failing, every
//! operation still succeeds; it just fetches from the platform each time.
//!
//! # Modules
//!
//! - [`platform`]: Platform detection and the supported set
//! - [`credentials`]: Per-user and system credential resolution
//! - [`data_sources`]: Platform API adapters behind the [`data_sources::VideoSource`] trait
//! - [`sentiment`]: Lexicon-based comment sentiment
//! - [`keywords`]: Keyword and hashtag signals
//! - [`metrics`]: Engagement rate, count formatting, growth between snapshots
//! - [`cache`]: Fault-tolerant cache facade with TTLs and history lists
//! - [`storage`]: SQLite backend for the cache and the credential store
//! - [`ratelimit`]: Fixed-window limiter shared through the cache
//! - [`aggregation`]: The analytics pipeline
//! - [`comparison`]: Ranking several videos side by side
//! - [`model`]: Data types
//! - [`error`]: Error taxonomy
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod cache;
pub mod comparison;
pub mod config;
pub mod credentials;
pub mod data_sources;
pub mod error;
pub mod keywords;
pub mod metrics;
pub mod model;
pub mod platform;
pub mod ratelimit;
pub mod sentiment;
pub mod storage;
