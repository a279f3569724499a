use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::fetcher::TranscriptFetcher;
use super::format::{self, TranscriptRecord};
use super::TrackKind;
use crate::cli::TranscriptFormat;

/// Fetch outcome plus the formatted renditions callers actually display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedTranscript {
    pub success: bool,

    /// Text in the requested format; absent on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_text: Option<String>,

    /// Full serializable record; absent on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TranscriptRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TranscriptMetadata>,

    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    pub language_code: String,
    pub kind: TrackKind,
    pub entry_count: usize,
}

/// Composes the fetcher and formatter into one fetch-and-format operation
///
/// Deliberately cache-agnostic: whoever calls this decides whether and how to
/// cache, which keeps the retry and formatting logic testable on their own.
pub struct TranscriptProcessor {
    fetcher: TranscriptFetcher,
}

impl TranscriptProcessor {
    pub fn new(fetcher: TranscriptFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch and format a transcript in one operation
    ///
    /// Failures pass through the fetcher's result untouched; no formatting is
    /// attempted on an empty transcript.
    pub async fn get_and_format(
        &self,
        video_id: &str,
        video_title: &str,
        languages: &[String],
        format_type: TranscriptFormat,
    ) -> ProcessedTranscript {
        let result = self.fetcher.get_transcript(video_id, languages).await;

        if !result.success {
            return ProcessedTranscript {
                success: false,
                formatted_text: None,
                record: None,
                metadata: None,
                attempts: result.attempts,
                error: result.error,
            };
        }

        let formatted_text = match format_type {
            TranscriptFormat::Timestamped => format::format_timestamped(&result.entries),
            TranscriptFormat::Plain => format::format_plain_text(&result.entries),
        };

        // Stamped once here, at fetch completion; later reformats of a
        // cached record keep this value.
        let record = format::to_record(video_id, video_title, &result, Utc::now());

        ProcessedTranscript {
            success: true,
            formatted_text: Some(formatted_text),
            metadata: Some(TranscriptMetadata {
                language_code: result.language_code.clone(),
                kind: result.kind,
                entry_count: result.entries.len(),
            }),
            record: Some(record),
            attempts: result.attempts,
            error: None,
        }
    }
}
