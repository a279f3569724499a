use async_trait::async_trait;

use super::{TrackKind, TranscriptEntry};
use crate::proxy::ProxyEndpoint;

/// Why an upstream fetch did not produce a transcript
///
/// The fetcher's retry policy hinges on this split: absence and disabled
/// captions are definitive and must not be retried, a per-language miss moves
/// on to the next language, and transient trouble may clear up on a later
/// attempt with a different egress identity.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    /// No track exists in the requested language; other languages may still
    /// have one
    #[error("No transcript found for language '{language}'")]
    NotFoundForLanguage { language: String },

    /// The video has no transcript in any language
    #[error("No transcript found")]
    NoTranscriptAvailable,

    /// The uploader turned captions off
    #[error("Transcripts disabled")]
    TranscriptsDisabled,

    /// Network trouble, rate limiting, malformed payloads - worth retrying
    #[error("{0}")]
    Transient(String),
}

impl UpstreamError {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            UpstreamError::NoTranscriptAvailable | UpstreamError::TranscriptsDisabled
        )
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Transient(e.to_string())
    }
}

/// A caption track as returned by the upstream source
#[derive(Debug, Clone)]
pub struct FetchedTrack {
    pub entries: Vec<TranscriptEntry>,
    pub language_code: String,
    pub kind: TrackKind,
}

/// One upstream transcript provider
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the transcript for a video, constrained to one language when
    /// given, otherwise whatever track the upstream offers first.
    async fn fetch(
        &self,
        video_id: &str,
        language: Option<&str>,
    ) -> Result<FetchedTrack, UpstreamError>;
}

/// Builds a fresh source per attempt so each retry can carry a different
/// proxy identity.
pub trait SourceFactory: Send + Sync {
    fn create(&self, proxy: Option<&ProxyEndpoint>) -> anyhow::Result<Box<dyn TranscriptSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanence_split() {
        assert!(UpstreamError::NoTranscriptAvailable.is_permanent());
        assert!(UpstreamError::TranscriptsDisabled.is_permanent());
        assert!(!UpstreamError::Transient("timeout".to_string()).is_permanent());
        assert!(!UpstreamError::NotFoundForLanguage {
            language: "en".to_string()
        }
        .is_permanent());
    }
}
