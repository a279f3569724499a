use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::transcript::{ProcessedTranscript, TranscriptMetadata};

/// Render the processed transcript as either the formatted text or the full
/// JSON record.
fn render(processed: &ProcessedTranscript, json: bool) -> Result<String> {
    if json {
        let record = processed
            .record
            .as_ref()
            .context("No transcript record to serialize")?;
        Ok(serde_json::to_string_pretty(record)?)
    } else {
        processed
            .formatted_text
            .clone()
            .context("No formatted transcript text")
    }
}

/// Save transcript output to a file
pub fn save_to_file(processed: &ProcessedTranscript, path: &Path, json: bool) -> Result<()> {
    let content = render(processed, json)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Metadata header shown above console output; zero attempts means the
/// transcript came from the cache rather than an upstream fetch.
fn header(metadata: &TranscriptMetadata, attempts: u32) -> String {
    let origin = if attempts == 0 {
        "cached".to_string()
    } else {
        format!("{attempts} attempt(s)")
    };

    format!(
        "{} entries, language '{}' ({origin})",
        metadata.entry_count, metadata.language_code
    )
}

/// Print transcript output to the console, with a short metadata header
pub fn print_to_console(processed: &ProcessedTranscript, json: bool) -> Result<()> {
    if let Some(metadata) = &processed.metadata {
        eprintln!(
            "{} {}",
            style("Transcript:").green().bold(),
            header(metadata, processed.attempts),
        );
    }

    println!("{}", render(processed, json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{ProcessedTranscript, TranscriptMetadata};

    fn processed() -> ProcessedTranscript {
        ProcessedTranscript {
            success: true,
            formatted_text: Some("[00:00] hi".to_string()),
            record: None,
            metadata: Some(TranscriptMetadata {
                language_code: "en".to_string(),
                kind: crate::transcript::TrackKind::Generated,
                entry_count: 1,
            }),
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn text_rendering_uses_formatted_text() {
        assert_eq!(render(&processed(), false).unwrap(), "[00:00] hi");
    }

    #[test]
    fn json_rendering_requires_a_record() {
        assert!(render(&processed(), true).is_err());
    }

    #[test]
    fn header_labels_cache_hits() {
        let metadata = processed().metadata.unwrap();
        assert_eq!(header(&metadata, 0), "1 entries, language 'en' (cached)");
        assert_eq!(header(&metadata, 3), "1 entries, language 'en' (3 attempt(s))");
    }

    #[test]
    fn saves_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        save_to_file(&processed(), &path, false).unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "[00:00] hi");
    }
}
