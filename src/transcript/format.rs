use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TrackKind, TranscriptEntry, TranscriptResult};

/// Serializable transcript record with full provenance metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub video_id: String,
    pub video_title: String,
    pub video_url: String,
    pub language_code: String,
    pub kind: TrackKind,
    pub entries: Vec<TranscriptEntry>,

    /// When the transcript was originally fetched. Reformatting a cached
    /// record keeps this timestamp; it is not refreshed at format time.
    pub collected_at: DateTime<Utc>,
}

/// Render entries as one `[MM:SS] text` line each, newline-joined
///
/// Entries at or past the one-hour mark switch to `[HH:MM:SS]` rather than
/// wrapping the minute field.
pub fn format_timestamped(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("[{}] {}", format_offset(entry.start), entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Caption text only, space-joined in entry order
pub fn format_plain_text(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the canonical record for a successful fetch
///
/// `collected_at` is supplied by the caller so the stamp reflects the fetch,
/// not whenever the record happens to be (re)built.
pub fn to_record(
    video_id: &str,
    video_title: &str,
    result: &TranscriptResult,
    collected_at: DateTime<Utc>,
) -> TranscriptRecord {
    TranscriptRecord {
        video_id: video_id.to_string(),
        video_title: video_title.to_string(),
        video_url: format!("https://www.youtube.com/watch?v={video_id}"),
        language_code: result.language_code.clone(),
        kind: result.kind,
        entries: result.entries.clone(),
        collected_at,
    }
}

fn format_offset(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, start: f64) -> TranscriptEntry {
        TranscriptEntry {
            text: text.to_string(),
            start,
            duration: 2.5,
        }
    }

    fn entries() -> Vec<TranscriptEntry> {
        vec![
            entry("first line", 0.0),
            entry("second line", 65.4),
            entry("third line", 599.9),
        ]
    }

    #[test]
    fn timestamped_has_one_line_per_entry() {
        let text = format_timestamped(&entries());
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn timestamped_lines_match_bracket_shape() {
        let text = format_timestamped(&entries());
        for line in text.lines() {
            let bytes = line.as_bytes();
            assert_eq!(bytes[0], b'[');
            assert!(bytes[1].is_ascii_digit() && bytes[2].is_ascii_digit());
            assert_eq!(bytes[3], b':');
            assert!(bytes[4].is_ascii_digit() && bytes[5].is_ascii_digit());
            assert_eq!(bytes[6], b']');
            assert_eq!(bytes[7], b' ');
        }
    }

    #[test]
    fn timestamped_values() {
        let text = format_timestamped(&entries());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[00:00] first line");
        assert_eq!(lines[1], "[01:05] second line");
        assert_eq!(lines[2], "[09:59] third line");
    }

    #[test]
    fn hour_long_offsets_grow_an_hour_field() {
        let long = vec![entry("late", 3750.0)];
        assert_eq!(format_timestamped(&long), "[01:02:30] late");
    }

    #[test]
    fn plain_text_is_space_join_in_order() {
        let text = format_plain_text(&entries());
        assert_eq!(text, "first line second line third line");
    }

    #[test]
    fn plain_text_is_stable_under_reformat() {
        let items = entries();
        assert_eq!(format_plain_text(&items), format_plain_text(&items));
    }

    #[test]
    fn empty_entries_format_to_empty_strings() {
        assert_eq!(format_timestamped(&[]), "");
        assert_eq!(format_plain_text(&[]), "");
    }

    #[test]
    fn record_serde_round_trip_preserves_entries() {
        let result = TranscriptResult::found(entries(), "bn", TrackKind::Manual, 2);
        let record = to_record("abc123", "Some Video", &result, Utc::now());

        let json = serde_json::to_string(&record).unwrap();
        let parsed: TranscriptRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.entries, record.entries);
        assert_eq!(parsed.language_code, "bn");
        assert_eq!(parsed.kind, TrackKind::Manual);
        assert_eq!(parsed.video_url, "https://www.youtube.com/watch?v=abc123");
    }
}
