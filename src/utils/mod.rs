use anyhow::Result;
use url::Url;

const MAX_VIDEO_ID_LEN: usize = 128;

/// Extract a video ID from the common YouTube URL shapes, or pass a bare ID
/// through. Returns `None` when the result would not be a safe identifier.
pub fn extract_video_id(input: &str) -> Option<String> {
    let raw = match Url::parse(input.trim()) {
        Ok(url) => id_from_url(&url)?,
        // Not a URL at all, treat it as a bare ID.
        Err(_) => input.trim().to_string(),
    };

    sanitize_video_id(&raw).ok()
}

fn id_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;

    if host == "youtu.be" {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string);
    }

    if host.ends_with("youtube.com") {
        if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
            return Some(id.into_owned());
        }

        // Shorts and embed URLs carry the ID as the second path segment.
        let mut segments = url.path_segments()?;
        if matches!(segments.next(), Some("shorts") | Some("embed")) {
            return segments.next().map(str::to_string);
        }
    }

    None
}

/// Ensure a video identifier is safe for downstream use (cache keys, API
/// calls). Only ASCII alphanumeric characters plus `_` and `-` are allowed.
pub fn sanitize_video_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        anyhow::bail!("Video ID cannot be empty");
    }

    if trimmed.len() > MAX_VIDEO_ID_LEN {
        anyhow::bail!("Video ID is unexpectedly long");
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        anyhow::bail!(
            "Video ID contains unsupported characters; expected only letters, numbers, '-' or '_'"
        );
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_short_and_embed_urls() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=xyz"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn passes_bare_id_through() {
        assert_eq!(
            extract_video_id("dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn rejects_unsafe_input() {
        assert!(extract_video_id("https://example.com/watch?v=abc").is_none());
        assert!(extract_video_id("abc/../../etc").is_none());
        assert!(sanitize_video_id("   ").is_err());
        assert!(sanitize_video_id(&"a".repeat(MAX_VIDEO_ID_LEN + 1)).is_err());
    }
}
