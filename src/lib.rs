//! Transcript Collector - a CLI tool for gathering YouTube transcripts
//!
//! This library fetches video transcripts through rotating proxies, formats
//! them into timestamped or plain-text renditions, and caches channel, video
//! listing, and transcript data in a local SQLite store with per-type
//! freshness windows.

pub mod cache;
pub mod cli;
pub mod config;
pub mod output;
pub mod proxy;
pub mod transcript;
pub mod utils;
pub mod youtube;

pub use cache::{Cache, EntityType};
pub use cli::{Cli, Commands, TranscriptFormat};
pub use config::Config;
pub use proxy::{ProxyEndpoint, ProxyRotator};
pub use transcript::{TranscriptEntry, TranscriptProcessor, TranscriptResult};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
