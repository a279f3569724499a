use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, EntityType};
use crate::config::YoutubeConfig;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Channel details as the rest of the tool consumes them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub title: String,
    pub channel_id: String,
    pub description: String,
    pub thumbnail: String,
    pub subscriber_count: String,
    pub video_count: String,
    pub uploads_playlist: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub title: String,
    pub channel_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub thumbnail: String,
}

/// Thin client for the YouTube Data API v3
///
/// Wraps every lookup with the cache: channel metadata rides the 7-day
/// window, video listings the 1-day window. This is also where paginated
/// iteration and the inter-request delay live; nothing here is clever on
/// purpose.
pub struct YoutubeClient {
    api_key: String,
    http: reqwest::Client,
    cache: Arc<Cache>,
    request_delay: Duration,
    max_videos: usize,
}

impl YoutubeClient {
    pub fn new(config: &YoutubeConfig, cache: Arc<Cache>) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("YouTube API key not configured (set youtube.api_key or YOUTUBE_API_KEY)");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            http,
            cache,
            request_delay: Duration::from_millis(config.request_delay_ms),
            max_videos: config.max_videos,
        })
    }

    /// Search channels by keyword
    pub async fn search_channels(&self, query: &str, max_results: usize) -> Result<Vec<ChannelSummary>> {
        let max_results = max_results.to_string();
        let response: SearchResponse = self
            .http
            .get(format!("{API_BASE}/search"))
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "channel"),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .context("Channel search failed")?
            .json()
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|item| ChannelSummary {
                title: item.snippet.channel_title,
                channel_id: item.snippet.channel_id,
                description: item.snippet.description,
            })
            .collect())
    }

    /// Detailed channel information, cache-first
    pub async fn get_channel_info(&self, channel_id: &str) -> Result<Option<ChannelInfo>> {
        if let Some(cached) = self.cache.get(EntityType::Channel, channel_id).await {
            if let Ok(info) = serde_json::from_value(cached) {
                return Ok(Some(info));
            }
        }

        let response: ChannelsResponse = self
            .http
            .get(format!("{API_BASE}/channels"))
            .query(&[
                ("part", "snippet,statistics,contentDetails"),
                ("id", channel_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .context("Channel lookup failed")?
            .json()
            .await?;

        let Some(item) = response.items.into_iter().next() else {
            return Ok(None);
        };

        let info = ChannelInfo {
            title: item.snippet.title,
            channel_id: channel_id.to_string(),
            description: item.snippet.description,
            thumbnail: item
                .snippet
                .thumbnails
                .and_then(|t| t.default)
                .map(|t| t.url)
                .unwrap_or_default(),
            subscriber_count: item.statistics.subscriber_count.unwrap_or_else(|| "N/A".to_string()),
            video_count: item.statistics.video_count.unwrap_or_else(|| "N/A".to_string()),
            uploads_playlist: item.content_details.related_playlists.uploads,
        };

        if let Ok(value) = serde_json::to_value(&info) {
            self.cache.put(EntityType::Channel, channel_id, &value).await;
        }

        Ok(Some(info))
    }

    /// Videos from a channel's uploads playlist, cache-first, paginated
    pub async fn get_channel_videos(
        &self,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<VideoInfo>> {
        let max_results = max_results.min(self.max_videos);

        if let Some(cached) = self.cache.get(EntityType::VideoListing, channel_id).await {
            if let Ok(videos) = serde_json::from_value::<Vec<VideoInfo>>(cached) {
                if videos.len() >= max_results {
                    let mut videos = videos;
                    videos.truncate(max_results);
                    return Ok(videos);
                }
            }
        }

        let channel = self
            .get_channel_info(channel_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Channel not found: {channel_id}"))?;

        let progress = ProgressBar::new(max_results as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap(),
        );
        progress.set_message("Loading videos...");

        let mut videos: Vec<VideoInfo> = Vec::new();
        let mut page_token: Option<String> = None;

        while videos.len() < max_results {
            let batch_size = (max_results - videos.len()).min(50).to_string();

            let mut request = self
                .http
                .get(format!("{API_BASE}/playlistItems"))
                .query(&[
                    ("part", "snippet"),
                    ("playlistId", channel.uploads_playlist.as_str()),
                    ("maxResults", batch_size.as_str()),
                    ("key", self.api_key.as_str()),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response: PlaylistResponse = request
                .send()
                .await?
                .error_for_status()
                .context("Playlist page fetch failed")?
                .json()
                .await?;

            if response.items.is_empty() {
                break;
            }

            for item in response.items {
                videos.push(VideoInfo {
                    video_id: item.snippet.resource_id.video_id,
                    title: item.snippet.title,
                    description: truncate_description(&item.snippet.description),
                    published_at: item.snippet.published_at,
                    thumbnail: item
                        .snippet
                        .thumbnails
                        .and_then(|t| t.default)
                        .map(|t| t.url)
                        .unwrap_or_default(),
                });
            }
            progress.set_position(videos.len().min(max_results) as u64);

            page_token = response.next_page_token;
            if page_token.is_none() || videos.len() >= max_results {
                break;
            }

            // Stay under the Data API rate limit
            tokio::time::sleep(self.request_delay).await;
        }

        progress.finish_and_clear();
        videos.truncate(max_results);

        if let Ok(value) = serde_json::to_value(&videos) {
            self.cache.put(EntityType::VideoListing, channel_id, &value).await;
        }

        tracing::info!("Fetched {} videos for channel {channel_id}", videos.len());
        Ok(videos)
    }

    /// Resolve a channel from an ID, @handle, or channel URL
    pub async fn resolve_channel(&self, input: &str) -> Result<Option<ChannelInfo>> {
        match parse_channel_query(input) {
            ChannelQuery::Id(id) => self.get_channel_info(&id).await,
            ChannelQuery::Handle(handle) => {
                // A cached channel whose title matches exactly spares the
                // search quota entirely.
                if let Some(cached) = self.cache.get_channel_by_name(&handle).await {
                    if let Ok(info) = serde_json::from_value(cached) {
                        return Ok(Some(info));
                    }
                }

                let matches = self.search_channels(&handle, 5).await?;
                match matches.first() {
                    Some(best) => self.get_channel_info(&best.channel_id).await,
                    None => Ok(None),
                }
            }
        }
    }
}

/// How the user referred to a channel
#[derive(Debug, PartialEq, Eq)]
enum ChannelQuery {
    Id(String),
    Handle(String),
}

fn parse_channel_query(input: &str) -> ChannelQuery {
    let input = input.trim();

    if let Some(rest) = input.split("channel/").nth(1) {
        let id = rest.split(['/', '?']).next().unwrap_or(rest);
        return ChannelQuery::Id(id.to_string());
    }

    if let Some(rest) = input.split('@').nth(1) {
        let handle = rest.split(['/', '?']).next().unwrap_or(rest);
        return ChannelQuery::Handle(handle.to_string());
    }

    // Bare channel IDs start with UC
    if input.starts_with("UC") && !input.contains(' ') {
        return ChannelQuery::Id(input.to_string());
    }

    ChannelQuery::Handle(input.to_string())
}

/// The Data API returns full descriptions; listings only need a preview
fn truncate_description(description: &str) -> String {
    const LIMIT: usize = 200;
    if description.chars().count() <= LIMIT {
        return description.to_string();
    }
    let truncated: String = description.chars().take(LIMIT).collect();
    format!("{truncated}...")
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    snippet: SearchSnippet,
}

#[derive(Deserialize)]
struct SearchSnippet {
    #[serde(rename = "channelTitle")]
    channel_title: String,
    #[serde(rename = "channelId")]
    channel_id: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    snippet: ChannelSnippet,
    statistics: ChannelStatistics,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    description: String,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct ChannelStatistics {
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
    #[serde(rename = "videoCount")]
    video_count: Option<String>,
}

#[derive(Deserialize)]
struct ContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: RelatedPlaylists,
}

#[derive(Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Deserialize)]
struct PlaylistResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Deserialize)]
struct PlaylistSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "publishedAt")]
    published_at: String,
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct ResourceId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}
