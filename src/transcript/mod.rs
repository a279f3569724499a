use serde::{Deserialize, Serialize};

pub mod fetcher;
pub mod format;
pub mod processor;
pub mod source;
pub mod youtube;

pub use fetcher::TranscriptFetcher;
pub use format::{format_plain_text, format_timestamped, to_record, TranscriptRecord};
pub use processor::{ProcessedTranscript, TranscriptMetadata, TranscriptProcessor};
pub use source::{FetchedTrack, SourceFactory, TranscriptSource, UpstreamError};

/// One caption unit: its text, when it starts, and how long it stays on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,

    /// Offset from the start of the video, in seconds
    pub start: f64,

    /// Display duration in seconds
    pub duration: f64,
}

/// Whether a caption track was produced by a human or by speech recognition
///
/// The upstream signal is best-effort; `Unknown` is carried through rather
/// than silently collapsed into a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Generated,
    Manual,
    Unknown,
}

impl TrackKind {
    /// Boolean view for callers that need one; an undetermined track is
    /// treated as generated, matching how auto-captions dominate in practice.
    pub fn is_generated(&self) -> bool {
        !matches!(self, TrackKind::Manual)
    }
}

/// Outcome of a transcript fetch, successful or not
///
/// Fetching never returns an `Err` across this boundary: permanent absence,
/// disabled captions, and exhausted retries all come back as a result with
/// `success == false` and a human-readable `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub success: bool,

    /// Caption entries in chronological order; empty on failure
    pub entries: Vec<TranscriptEntry>,

    /// Language the transcript was found in, or "unknown" for the
    /// first-available fallback track
    pub language_code: String,

    pub kind: TrackKind,

    /// Attempts consumed, including the final one
    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptResult {
    pub fn found(
        entries: Vec<TranscriptEntry>,
        language_code: impl Into<String>,
        kind: TrackKind,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            entries,
            language_code: language_code.into(),
            kind,
            attempts,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            entries: Vec::new(),
            language_code: "unknown".to_string(),
            kind: TrackKind::Unknown,
            attempts,
            error: Some(error.into()),
        }
    }
}
