use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcript_collector::cache::{Cache, EntityType};
use transcript_collector::cli::{CacheCommands, ChannelCommands, Cli, Commands, TranscriptFormat};
use transcript_collector::config::Config;
use transcript_collector::transcript::youtube::YoutubeSourceFactory;
use transcript_collector::transcript::{
    format_plain_text, format_timestamped, ProcessedTranscript, TranscriptFetcher,
    TranscriptMetadata, TranscriptProcessor, TranscriptRecord,
};
use transcript_collector::youtube::YoutubeClient;
use transcript_collector::{output, proxy, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "transcript_collector=debug,collector=debug"
    } else {
        "transcript_collector=info,collector=info"
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().await?;

    match cli.command {
        Commands::Fetch {
            video,
            title,
            languages,
            format,
            output,
            json,
            no_cache,
        } => {
            let video_id = utils::extract_video_id(&video)
                .context("Could not extract a video ID from the given input")?;

            let languages = if languages.is_empty() {
                config.app.default_languages.clone()
            } else {
                languages
            };

            let cache = open_cache(&config).await;
            let processed =
                fetch_transcript(&config, &cache, &video_id, &title, &languages, format, no_cache)
                    .await?;

            match output {
                Some(path) => {
                    output::save_to_file(&processed, &path, json)?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => output::print_to_console(&processed, json)?,
            }
        }
        Commands::Channel { command } => {
            let cache = Arc::new(open_cache(&config).await);
            let client = YoutubeClient::new(&config.youtube, cache)?;

            match command {
                ChannelCommands::Info { channel } => match client.resolve_channel(&channel).await? {
                    Some(info) => {
                        println!("Channel: {}", info.title);
                        println!("  ID: {}", info.channel_id);
                        println!("  Subscribers: {}", info.subscriber_count);
                        println!("  Videos: {}", info.video_count);
                        if !info.description.is_empty() {
                            println!("  Description: {}", info.description);
                        }
                    }
                    None => println!("Channel not found"),
                },
                ChannelCommands::Videos { channel_id, max } => {
                    let videos = client.get_channel_videos(&channel_id, max).await?;
                    for video in &videos {
                        println!("{}  {}  {}", video.video_id, video.published_at, video.title);
                    }
                    println!("\n{} video(s)", videos.len());
                }
            }
        }
        Commands::Cache { command } => {
            let cache = open_cache(&config).await;

            match command {
                CacheCommands::Stats => {
                    let stats = cache.stats().await;
                    if !stats.enabled {
                        println!("Cache is unavailable");
                    } else {
                        println!("Cache entries:");
                        println!("  Channels: {}", stats.channels);
                        println!("  Video listings: {}", stats.video_listings);
                        println!("  Transcripts: {}", stats.transcripts);
                    }
                }
                CacheCommands::Purge { days } => {
                    let deleted = cache.purge_older_than(days).await;
                    println!("Purged {deleted} entries older than {days} days");
                }
            }
        }
        Commands::Proxies => {
            match proxy::build_rotator(&config)? {
                None => println!("Proxy rotation is disabled"),
                Some(rotator) => {
                    let endpoints = rotator.endpoints().await?;
                    println!("Strategy: {}", rotator.strategy_name());
                    println!("Total proxies: {}", endpoints.len());
                    if let Some(age) = rotator.list_age() {
                        println!("List age: {} minute(s)", age.num_minutes());
                    }

                    let mut by_country: BTreeMap<String, usize> = BTreeMap::new();
                    for endpoint in &endpoints {
                        let country = endpoint
                            .country_code
                            .clone()
                            .unwrap_or_else(|| "Unknown".to_string());
                        *by_country.entry(country).or_default() += 1;
                    }

                    if !by_country.is_empty() {
                        println!("Proxies by country:");
                        for (country, count) in by_country {
                            println!("  {country}: {count}");
                        }
                    }
                }
            }
        }
        Commands::Config => {
            config.display();
        }
    }

    Ok(())
}

async fn open_cache(config: &Config) -> Cache {
    if !config.cache.enabled {
        return Cache::disabled();
    }

    match config.cache_db_path() {
        Ok(path) => Cache::connect(&path).await,
        Err(e) => {
            tracing::warn!("Cache path unavailable: {e}");
            Cache::disabled()
        }
    }
}

/// Cache-first transcript retrieval; on a miss, runs the full fetch-and-format
/// pipeline and stores the record for next time.
async fn fetch_transcript(
    config: &Config,
    cache: &Cache,
    video_id: &str,
    title: &str,
    languages: &[String],
    format: TranscriptFormat,
    no_cache: bool,
) -> Result<ProcessedTranscript> {
    if !no_cache {
        if let Some(cached) = cache.get(EntityType::Transcript, video_id).await {
            if let Ok(record) = serde_json::from_value::<TranscriptRecord>(cached) {
                tracing::info!("Serving transcript for {video_id} from cache");
                return Ok(reformat_record(record, format));
            }
        }
    }

    let rotator = proxy::build_rotator(config)?;
    let fetcher = TranscriptFetcher::new(Arc::new(YoutubeSourceFactory), rotator, &config.retry);
    let processor = TranscriptProcessor::new(fetcher);

    let processed = processor
        .get_and_format(video_id, title, languages, format)
        .await;

    if !processed.success {
        anyhow::bail!(
            "Could not fetch transcript after {} attempt(s): {}",
            processed.attempts,
            processed
                .error
                .as_deref()
                .unwrap_or("unknown error")
        );
    }

    if let Some(record) = &processed.record {
        if let Ok(value) = serde_json::to_value(record) {
            cache.put(EntityType::Transcript, video_id, &value).await;
        }
    }

    Ok(processed)
}

/// Rebuild a processed view from a cached record; the record's original
/// `collected_at` is kept. `attempts` is 0 because no upstream attempt
/// happened - that zero is how downstream output tells a cache hit apart
/// from a single-attempt fetch.
fn reformat_record(record: TranscriptRecord, format: TranscriptFormat) -> ProcessedTranscript {
    let formatted_text = match format {
        TranscriptFormat::Timestamped => format_timestamped(&record.entries),
        TranscriptFormat::Plain => format_plain_text(&record.entries),
    };

    ProcessedTranscript {
        success: true,
        formatted_text: Some(formatted_text),
        metadata: Some(TranscriptMetadata {
            language_code: record.language_code.clone(),
            kind: record.kind,
            entry_count: record.entries.len(),
        }),
        record: Some(record),
        attempts: 0,
        error: None,
    }
}
