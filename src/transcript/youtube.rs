use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::source::{FetchedTrack, SourceFactory, TranscriptSource, UpstreamError};
use super::{TrackKind, TranscriptEntry};
use crate::proxy::ProxyEndpoint;

const WATCH_URL: &str = "https://www.youtube.com/watch";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Builds a [`YoutubeSource`] per attempt, wired through the given proxy
pub struct YoutubeSourceFactory;

impl SourceFactory for YoutubeSourceFactory {
    fn create(&self, proxy: Option<&ProxyEndpoint>) -> anyhow::Result<Box<dyn TranscriptSource>> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT);

        if let Some(endpoint) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(endpoint.url())?);
        }

        Ok(Box::new(YoutubeSource {
            http: builder.build()?,
        }))
    }
}

/// Scrapes caption tracks off the watch page, the same route the upstream
/// transcript libraries take. Thin by intent; the interesting logic lives in
/// the fetcher that drives it.
pub struct YoutubeSource {
    http: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

impl RawCaptionTrack {
    fn track_kind(&self) -> TrackKind {
        match self.kind.as_deref() {
            Some("asr") => TrackKind::Generated,
            Some(_) => TrackKind::Unknown,
            None => TrackKind::Manual,
        }
    }
}

#[async_trait]
impl TranscriptSource for YoutubeSource {
    async fn fetch(
        &self,
        video_id: &str,
        language: Option<&str>,
    ) -> Result<FetchedTrack, UpstreamError> {
        let page = self
            .http
            .get(WATCH_URL)
            .query(&[("v", video_id)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| UpstreamError::Transient(format!("Watch page request failed: {e}")))?
            .text()
            .await?;

        let tracks = parse_caption_tracks(&page)?;
        let track = select_track(&tracks, language)?;

        let xml = self
            .http
            .get(&track.base_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| UpstreamError::Transient(format!("Caption track request failed: {e}")))?
            .text()
            .await?;

        let entries = parse_timedtext(&xml);
        if entries.is_empty() {
            return Err(UpstreamError::Transient(
                "Caption track payload was empty".to_string(),
            ));
        }

        Ok(FetchedTrack {
            entries,
            language_code: track.language_code.clone(),
            kind: track.track_kind(),
        })
    }
}

/// Pull the caption track list out of the watch page player config
fn parse_caption_tracks(page: &str) -> Result<Vec<RawCaptionTrack>, UpstreamError> {
    // A watch page without a captions section means the uploader turned
    // captions off; a present-but-empty track list means none exist.
    if !page.contains("\"captions\":") {
        if page.contains("\"playabilityStatus\":") {
            return Err(UpstreamError::TranscriptsDisabled);
        }
        return Err(UpstreamError::Transient(
            "Unrecognized watch page payload".to_string(),
        ));
    }

    let marker = "\"captionTracks\":";
    let start = match page.find(marker) {
        Some(index) => index + marker.len(),
        None => return Err(UpstreamError::NoTranscriptAvailable),
    };

    let array =
        extract_json_array(&page[start..]).ok_or(UpstreamError::NoTranscriptAvailable)?;

    let tracks: Vec<RawCaptionTrack> = serde_json::from_str(array)
        .map_err(|e| UpstreamError::Transient(format!("Could not parse caption tracks: {e}")))?;

    if tracks.is_empty() {
        return Err(UpstreamError::NoTranscriptAvailable);
    }

    Ok(tracks)
}

fn select_track<'a>(
    tracks: &'a [RawCaptionTrack],
    language: Option<&str>,
) -> Result<&'a RawCaptionTrack, UpstreamError> {
    match language {
        Some(lang) => tracks
            .iter()
            .find(|track| track.language_code == lang)
            .ok_or_else(|| UpstreamError::NotFoundForLanguage {
                language: lang.to_string(),
            }),
        None => Ok(&tracks[0]),
    }
}

/// Slice out a balanced JSON array starting at the front of `input`
fn extract_json_array(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the `<text start="..." dur="...">` snippets of a timedtext document
///
/// The payload is simple enough that attribute scanning beats pulling in an
/// XML parser; text content is HTML-encoded twice by the upstream.
fn parse_timedtext(xml: &str) -> Vec<TranscriptEntry> {
    let mut entries = Vec::new();
    let mut rest = xml;

    while let Some(open) = rest.find("<text") {
        let after_open = &rest[open..];
        let Some(tag_end) = after_open.find('>') else {
            break;
        };

        let tag = &after_open[..tag_end];
        let body_start = tag_end + 1;

        let Some(close) = after_open[body_start..].find("</text>") else {
            break;
        };
        let body = &after_open[body_start..body_start + close];

        let start = attr_value(tag, "start").and_then(|v| v.parse::<f64>().ok());
        let duration = attr_value(tag, "dur").and_then(|v| v.parse::<f64>().ok());

        if let Some(start) = start {
            let once = html_escape::decode_html_entities(body);
            let text = html_escape::decode_html_entities(once.as_ref()).trim().to_string();
            if !text.is_empty() {
                entries.push(TranscriptEntry {
                    text,
                    start,
                    duration: duration.unwrap_or(0.0),
                });
            }
        }

        rest = &after_open[body_start + close..];
    }

    entries
}

fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{name}=\"");
    let start = tag.find(&marker)? + marker.len();
    let end = tag[start..].find('"')?;
    Some(&tag[start..start + end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEDTEXT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<transcript>
<text start="0.12" dur="2.5">hello &amp;amp; welcome</text>
<text start="2.62" dur="3.1">second &amp;#39;line&amp;#39;</text>
<text start="5.72" dur="1.0"></text>
</transcript>"#;

    #[test]
    fn timedtext_parsing() {
        let entries = parse_timedtext(TIMEDTEXT);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "hello & welcome");
        assert!((entries[0].start - 0.12).abs() < 1e-9);
        assert!((entries[0].duration - 2.5).abs() < 1e-9);
        assert_eq!(entries[1].text, "second 'line'");
    }

    #[test]
    fn caption_tracks_extracted_from_page() {
        let page = r#"stuff"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://example.com/tt?lang=en","languageCode":"en","kind":"asr"},{"baseUrl":"https://example.com/tt?lang=bn","languageCode":"bn"}]}}more"#;
        let tracks = parse_caption_tracks(page).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_kind(), TrackKind::Generated);
        assert_eq!(tracks[1].track_kind(), TrackKind::Manual);
    }

    #[test]
    fn page_without_captions_section_is_disabled() {
        let page = r#"{"playabilityStatus":{"status":"OK"},"videoDetails":{}}"#;
        assert!(matches!(
            parse_caption_tracks(page),
            Err(UpstreamError::TranscriptsDisabled)
        ));
    }

    #[test]
    fn empty_track_list_is_unavailable() {
        let page = r#""captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[]}}"#;
        assert!(matches!(
            parse_caption_tracks(page),
            Err(UpstreamError::NoTranscriptAvailable)
        ));
    }

    #[test]
    fn missing_language_is_not_found_for_that_language() {
        let tracks = vec![RawCaptionTrack {
            base_url: "u".to_string(),
            language_code: "en".to_string(),
            kind: None,
        }];
        assert!(matches!(
            select_track(&tracks, Some("bn")),
            Err(UpstreamError::NotFoundForLanguage { .. })
        ));
        assert!(select_track(&tracks, None).is_ok());
    }

    #[test]
    fn balanced_array_extraction_handles_nesting() {
        let input = r#"[{"a":[1,2],"b":"x]y"},{"c":3}] trailing"#;
        assert_eq!(
            extract_json_array(input),
            Some(r#"[{"a":[1,2],"b":"x]y"},{"c":3}]"#)
        );
    }
}
