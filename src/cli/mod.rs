use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "collector",
    about = "Transcript Collector - Fetch YouTube transcripts with proxy rotation and local caching",
    version,
    long_about = "A CLI tool for collecting transcripts from YouTube videos. Transient upstream \
failures are retried through a rotating proxy pool, and channel, video, and transcript data are \
cached locally with per-type freshness windows."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and format the transcript for a video
    Fetch {
        /// Video URL or bare video ID
        #[arg(value_name = "URL_OR_ID")]
        video: String,

        /// Video title to embed in the saved record
        #[arg(short, long, default_value = "")]
        title: String,

        /// Language codes to try, in priority order
        #[arg(short, long, value_name = "LANG", num_args = 1..)]
        languages: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "timestamped")]
        format: TranscriptFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save the full JSON record instead of formatted text
        #[arg(long)]
        json: bool,

        /// Bypass the transcript cache and fetch fresh
        #[arg(long)]
        no_cache: bool,
    },

    /// Look up channel information and video listings
    Channel {
        #[command(subcommand)]
        command: ChannelCommands,
    },

    /// Inspect or maintain the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show proxy pool status
    Proxies,

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
pub enum ChannelCommands {
    /// Show channel details by ID, @handle, or URL
    Info {
        /// Channel ID, @handle, or channel URL
        channel: String,
    },

    /// List videos uploaded by a channel
    Videos {
        /// Channel ID
        channel_id: String,

        /// Maximum number of videos to list
        #[arg(short, long, default_value = "50")]
        max: usize,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache entry counts per entity type
    Stats,

    /// Delete cache entries older than the given age
    Purge {
        /// Age threshold in days
        #[arg(long, default_value = "30")]
        days: i64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptFormat {
    /// One "[MM:SS] text" line per caption entry
    Timestamped,
    /// Caption text only, space-joined
    Plain,
}

impl std::fmt::Display for TranscriptFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptFormat::Timestamped => write!(f, "timestamped"),
            TranscriptFormat::Plain => write!(f, "plain"),
        }
    }
}
