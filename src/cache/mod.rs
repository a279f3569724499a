use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// What kind of data a cache entry holds; each type tolerates a different
/// amount of staleness before a read treats the entry as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    /// Channel metadata - fresh for 7 days
    Channel,
    /// Per-channel video listings - fresh for 1 day
    VideoListing,
    /// Transcripts never go stale; only absence causes a miss
    Transcript,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Channel => "channel",
            EntityType::VideoListing => "video_listing",
            EntityType::Transcript => "transcript",
        }
    }

    /// Maximum age before a read misses; `None` means entries never expire
    pub fn freshness_window(&self) -> Option<Duration> {
        match self {
            EntityType::Channel => Some(Duration::days(7)),
            EntityType::VideoListing => Some(Duration::days(1)),
            EntityType::Transcript => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub channels: i64,
    pub video_listings: i64,
    pub transcripts: i64,
}

/// SQLite-backed cache keyed by (entity type, identifier)
///
/// One row per key; writes upsert. If the initial connection fails the cache
/// latches into a disabled mode for the rest of the process: every read
/// misses, every write is a no-op, and nothing propagates to callers. Query
/// errors at runtime degrade the same way.
pub struct Cache {
    pool: Option<SqlitePool>,
}

impl Cache {
    /// Open (or create) the database at `path`; never fails
    pub async fn connect(path: &Path) -> Self {
        match Self::try_connect(path).await {
            Ok(pool) => {
                tracing::info!("Cache connected at {}", path.display());
                Self { pool: Some(pool) }
            }
            Err(e) => {
                tracing::warn!("Cache unavailable, continuing without it: {e}");
                Self { pool: None }
            }
        }
    }

    /// A cache that never hits and never stores
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    async fn try_connect(path: &Path) -> crate::Result<SqlitePool> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                entity_type TEXT NOT NULL,
                key TEXT NOT NULL,
                payload TEXT NOT NULL,
                stored_at INTEGER NOT NULL,
                UNIQUE(entity_type, key)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cache_recency
             ON cache_entries (entity_type, key, stored_at DESC)",
        )
        .execute(&pool)
        .await?;

        Ok(pool)
    }

    /// Most recent non-stale payload for a key, or a miss
    pub async fn get(&self, entity: EntityType, key: &str) -> Option<serde_json::Value> {
        let pool = self.pool.as_ref()?;

        let query = match entity.freshness_window() {
            Some(window) => {
                let cutoff = (Utc::now() - window).timestamp();
                sqlx::query(
                    "SELECT payload FROM cache_entries
                     WHERE entity_type = ?1 AND key = ?2 AND stored_at >= ?3
                     ORDER BY stored_at DESC LIMIT 1",
                )
                .bind(entity.as_str())
                .bind(key)
                .bind(cutoff)
            }
            None => sqlx::query(
                "SELECT payload FROM cache_entries
                 WHERE entity_type = ?1 AND key = ?2
                 ORDER BY stored_at DESC LIMIT 1",
            )
            .bind(entity.as_str())
            .bind(key),
        };

        match query.fetch_optional(pool).await {
            Ok(Some(row)) => {
                let payload: String = row.try_get("payload").ok()?;
                match serde_json::from_str(&payload) {
                    Ok(value) => {
                        tracing::debug!("Cache hit: {} {key}", entity.as_str());
                        Some(value)
                    }
                    Err(e) => {
                        tracing::warn!("Corrupt cache payload for {} {key}: {e}", entity.as_str());
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for {} {key}: {e}", entity.as_str());
                None
            }
        }
    }

    /// Channel lookup by exact name, for callers that only know the title
    pub async fn get_channel_by_name(&self, name: &str) -> Option<serde_json::Value> {
        let pool = self.pool.as_ref()?;
        let cutoff = match EntityType::Channel.freshness_window() {
            Some(window) => (Utc::now() - window).timestamp(),
            None => 0,
        };

        let row = sqlx::query(
            "SELECT payload FROM cache_entries
             WHERE entity_type = 'channel'
               AND json_extract(payload, '$.title') = ?1
               AND stored_at >= ?2
             ORDER BY stored_at DESC LIMIT 1",
        )
        .bind(name)
        .bind(cutoff)
        .fetch_optional(pool)
        .await;

        match row {
            Ok(Some(row)) => {
                let payload: String = row.try_get("payload").ok()?;
                serde_json::from_str(&payload).ok()
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for channel name {name}: {e}");
                None
            }
        }
    }

    /// Store a payload timestamped now
    pub async fn put(&self, entity: EntityType, key: &str, payload: &serde_json::Value) {
        self.put_at(entity, key, payload, Utc::now()).await;
    }

    /// Store a payload with an explicit timestamp (backfills, tests)
    pub async fn put_at(
        &self,
        entity: EntityType,
        key: &str,
        payload: &serde_json::Value,
        stored_at: DateTime<Utc>,
    ) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };

        let result = sqlx::query(
            "INSERT INTO cache_entries (entity_type, key, payload, stored_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_type, key)
             DO UPDATE SET payload = excluded.payload, stored_at = excluded.stored_at",
        )
        .bind(entity.as_str())
        .bind(key)
        .bind(payload.to_string())
        .bind(stored_at.timestamp())
        .execute(pool)
        .await;

        match result {
            Ok(_) => tracing::debug!("Cached {} {key}", entity.as_str()),
            Err(e) => tracing::warn!("Cache write failed for {} {key}: {e}", entity.as_str()),
        }
    }

    /// Delete entries older than `days`, across all entity types
    ///
    /// Maintenance only; independent of the per-type freshness windows the
    /// read path applies.
    pub async fn purge_older_than(&self, days: i64) -> u64 {
        let Some(pool) = self.pool.as_ref() else {
            return 0;
        };

        let cutoff = (Utc::now() - Duration::days(days)).timestamp();

        match sqlx::query("DELETE FROM cache_entries WHERE stored_at < ?1")
            .bind(cutoff)
            .execute(pool)
            .await
        {
            Ok(result) => {
                let deleted = result.rows_affected();
                tracing::info!("Purged {deleted} cache entries older than {days} days");
                deleted
            }
            Err(e) => {
                tracing::warn!("Cache purge failed: {e}");
                0
            }
        }
    }

    /// Entry counts per entity type
    pub async fn stats(&self) -> CacheStats {
        let Some(pool) = self.pool.as_ref() else {
            return CacheStats {
                enabled: false,
                channels: 0,
                video_listings: 0,
                transcripts: 0,
            };
        };

        CacheStats {
            enabled: true,
            channels: count_entries(pool, EntityType::Channel).await,
            video_listings: count_entries(pool, EntityType::VideoListing).await,
            transcripts: count_entries(pool, EntityType::Transcript).await,
        }
    }
}

async fn count_entries(pool: &SqlitePool, entity: EntityType) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cache_entries WHERE entity_type = ?1")
        .bind(entity.as_str())
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}
