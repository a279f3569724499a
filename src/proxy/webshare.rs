use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{ProxyEndpoint, ProxyRotator};
use crate::config::ProxySelection;
use crate::Result;

const LIST_FETCH_TIMEOUT_SECS: u64 = 10;

/// After a failed list fetch, do not retry the provider for this long; the
/// stale in-memory list (if any) keeps serving in the meantime.
const REFRESH_COOLDOWN_SECS: i64 = 60;

/// Failures talking to the proxy provider API
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// The API key was rejected; retrying cannot help
    #[error("Proxy provider rejected the API key (HTTP 401)")]
    Unauthorized,

    #[error("Proxy provider returned HTTP {0}")]
    Api(u16),

    #[error("Proxy provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Rotates through a proxy list fetched from the Webshare API
///
/// The fetched list is persisted to disk and treated as valid for a
/// configurable duration; while valid, no network traffic happens. A
/// transport failure falls back to the on-disk list even when stale. An
/// authentication failure is surfaced immediately.
pub struct WebsharePool {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    cache_file: PathBuf,
    cache_duration: Duration,
    selection: ProxySelection,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    proxies: Vec<ProxyEndpoint>,
    last_fetch: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    cursor: usize,
}

/// On-disk snapshot of the last successful list fetch
#[derive(Serialize, Deserialize)]
struct CacheFile {
    proxies: Vec<ProxyEndpoint>,
    last_fetch: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<ProviderProxy>,
}

#[derive(Deserialize)]
struct ProviderProxy {
    proxy_address: String,
    port: u16,
    username: String,
    password: String,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default = "default_valid")]
    valid: bool,
}

fn default_valid() -> bool {
    true
}

impl WebsharePool {
    pub fn new(
        api_key: String,
        cache_file: PathBuf,
        cache_minutes: i64,
        selection: ProxySelection,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(LIST_FETCH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_key,
            base_url: "https://proxy.webshare.io/api/v2".to_string(),
            http,
            cache_file,
            cache_duration: Duration::minutes(cache_minutes.max(1)),
            selection,
            state: Mutex::new(PoolState::default()),
        })
    }

    #[cfg(test)]
    fn with_pool(
        proxies: Vec<ProxyEndpoint>,
        cache_file: PathBuf,
        selection: ProxySelection,
    ) -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            http: reqwest::Client::new(),
            cache_file,
            cache_duration: Duration::minutes(60),
            selection,
            state: Mutex::new(PoolState {
                proxies,
                last_fetch: Some(Utc::now()),
                last_attempt: None,
                cursor: 0,
            }),
        }
    }

    #[cfg(test)]
    fn with_base_url(base_url: &str, cache_file: PathBuf) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();

        Self {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            http,
            cache_file,
            cache_duration: Duration::minutes(60),
            selection: ProxySelection::RoundRobin,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Whether the in-memory list is present and within its validity window
    fn is_fresh(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.last_fetch {
            Some(fetched) if !state.proxies.is_empty() => {
                Utc::now() - fetched < self.cache_duration
            }
            _ => false,
        }
    }

    /// Fetch the live list from the provider
    async fn fetch_list(&self) -> std::result::Result<Vec<ProxyEndpoint>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/proxy/list/?mode=direct", self.base_url))
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(ProviderError::Unauthorized),
            status => return Err(ProviderError::Api(status)),
        }

        let list: ListResponse = response.json().await?;

        let proxies = list
            .results
            .into_iter()
            .filter(|proxy| proxy.valid)
            .map(|proxy| ProxyEndpoint {
                host: proxy.proxy_address,
                port: proxy.port,
                username: proxy.username,
                password: proxy.password,
                country_code: proxy.country_code,
                city: proxy.city_name,
            })
            .collect();

        Ok(proxies)
    }

    /// Whether a refresh attempt is allowed; failed attempts are not repeated
    /// until the cooldown passes.
    fn refresh_due(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.last_attempt {
            Some(attempted) => {
                Utc::now() - attempted >= Duration::seconds(REFRESH_COOLDOWN_SECS)
            }
            None => true,
        }
    }

    /// Refresh the in-memory list, preferring the live API and falling back
    /// to the on-disk snapshot on transport problems.
    async fn refresh(&self) -> Result<()> {
        self.state.lock().unwrap().last_attempt = Some(Utc::now());

        match self.fetch_list().await {
            Ok(proxies) => {
                let fetched_at = Utc::now();
                tracing::info!("Fetched {} working proxies from provider", proxies.len());

                {
                    let mut state = self.state.lock().unwrap();
                    state.proxies = proxies.clone();
                    state.last_fetch = Some(fetched_at);
                    state.cursor = 0;
                }

                if let Err(e) = self.save_cache_file(&proxies, fetched_at) {
                    tracing::warn!("Could not persist proxy list: {e}");
                }
                Ok(())
            }
            Err(ProviderError::Unauthorized) => Err(ProviderError::Unauthorized.into()),
            Err(e) => {
                tracing::warn!("Proxy list fetch failed: {e}");
                if self.load_cache_file() {
                    tracing::info!("Using stale proxy list from disk cache");
                } else {
                    tracing::warn!("No cached proxy list available; continuing without proxies");
                }
                Ok(())
            }
        }
    }

    fn save_cache_file(&self, proxies: &[ProxyEndpoint], last_fetch: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let snapshot = CacheFile {
            proxies: proxies.to_vec(),
            last_fetch,
        };
        fs_err::write(&self.cache_file, serde_json::to_vec(&snapshot)?)?;
        Ok(())
    }

    /// Load the on-disk snapshot into memory; returns false when absent or
    /// unreadable.
    fn load_cache_file(&self) -> bool {
        let content = match fs_err::read(&self.cache_file) {
            Ok(content) => content,
            Err(_) => return false,
        };

        match serde_json::from_slice::<CacheFile>(&content) {
            Ok(snapshot) if !snapshot.proxies.is_empty() => {
                let mut state = self.state.lock().unwrap();
                state.proxies = snapshot.proxies;
                state.last_fetch = Some(snapshot.last_fetch);
                state.cursor = 0;
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("Could not parse proxy cache file: {e}");
                false
            }
        }
    }

    fn select(&self) -> Option<ProxyEndpoint> {
        let mut state = self.state.lock().unwrap();
        if state.proxies.is_empty() {
            return None;
        }

        let index = match self.selection {
            ProxySelection::RoundRobin => {
                let index = state.cursor % state.proxies.len();
                state.cursor = (state.cursor + 1) % state.proxies.len();
                index
            }
            ProxySelection::Random => rand::thread_rng().gen_range(0..state.proxies.len()),
        };

        Some(state.proxies[index].clone())
    }

}

#[async_trait]
impl ProxyRotator for WebsharePool {
    async fn next(&self) -> Result<Option<ProxyEndpoint>> {
        if !self.is_fresh() && self.refresh_due() {
            self.refresh().await?;
        }

        Ok(self.select())
    }

    async fn endpoints(&self) -> Result<Vec<ProxyEndpoint>> {
        if !self.is_fresh() && self.refresh_due() {
            self.refresh().await?;
        }

        Ok(self.state.lock().unwrap().proxies.clone())
    }

    fn strategy_name(&self) -> &'static str {
        "webshare"
    }

    fn list_age(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        state.last_fetch.map(|fetched| Utc::now() - fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_proxies(count: usize) -> Vec<ProxyEndpoint> {
        (0..count)
            .map(|i| ProxyEndpoint {
                host: format!("p{i}.example.com"),
                port: 8000 + i as u16,
                username: format!("user{i}"),
                password: "pw".to_string(),
                country_code: Some("US".to_string()),
                city: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn round_robin_cycles_over_pool() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WebsharePool::with_pool(
            sample_proxies(3),
            dir.path().join("cache.json"),
            ProxySelection::RoundRobin,
        );

        let mut hosts = Vec::new();
        for _ in 0..7 {
            hosts.push(pool.next().await.unwrap().unwrap().host);
        }

        assert_eq!(
            hosts,
            vec![
                "p0.example.com",
                "p1.example.com",
                "p2.example.com",
                "p0.example.com",
                "p1.example.com",
                "p2.example.com",
                "p0.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn random_selection_stays_in_pool() {
        let dir = tempfile::tempdir().unwrap();
        let proxies = sample_proxies(3);
        let pool = WebsharePool::with_pool(
            proxies.clone(),
            dir.path().join("cache.json"),
            ProxySelection::Random,
        );

        for _ in 0..20 {
            let endpoint = pool.next().await.unwrap().unwrap();
            assert!(proxies.contains(&endpoint));
        }
    }

    #[test]
    fn disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.json");
        let proxies = sample_proxies(2);

        let writer = WebsharePool::with_pool(
            proxies.clone(),
            cache_file.clone(),
            ProxySelection::RoundRobin,
        );
        writer.save_cache_file(&proxies, Utc::now()).unwrap();

        let reader = WebsharePool::with_pool(Vec::new(), cache_file, ProxySelection::RoundRobin);
        assert!(reader.load_cache_file());
        assert_eq!(reader.state.lock().unwrap().proxies, proxies);
    }

    #[test]
    fn missing_cache_file_reports_absent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WebsharePool::with_pool(
            Vec::new(),
            dir.path().join("nope.json"),
            ProxySelection::RoundRobin,
        );
        assert!(!pool.load_cache_file());
    }

    /// One-shot HTTP listener answering every connection with `status`
    async fn serve_status(status: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn rejected_api_key_surfaces_as_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let base_url = serve_status("401 Unauthorized").await;
        let pool = WebsharePool::with_base_url(&base_url, dir.path().join("cache.json"));

        let err = pool.next().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn transport_failure_serves_stale_disk_list() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache.json");
        let proxies = sample_proxies(2);

        // Snapshot from a past run, well outside the freshness window
        let seeder =
            WebsharePool::with_pool(proxies.clone(), cache_file.clone(), ProxySelection::RoundRobin);
        seeder
            .save_cache_file(&proxies, Utc::now() - Duration::hours(12))
            .unwrap();

        // Nothing listens on port 1, so the live fetch fails fast
        let pool = WebsharePool::with_base_url("http://127.0.0.1:1", cache_file);

        let endpoint = pool.next().await.unwrap();
        assert_eq!(endpoint.unwrap().host, "p0.example.com");
        assert_eq!(pool.endpoints().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_is_not_retried_within_cooldown() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let connections = std::sync::Arc::new(AtomicUsize::new(0));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Count connections, then hang up without answering
        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let pool =
            WebsharePool::with_base_url(&format!("http://{addr}"), dir.path().join("cache.json"));

        assert!(pool.next().await.unwrap().is_none());
        assert!(pool.next().await.unwrap().is_none());
        assert!(pool.next().await.unwrap().is_none());

        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_pool_is_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WebsharePool::with_pool(
            Vec::new(),
            dir.path().join("cache.json"),
            ProxySelection::RoundRobin,
        );
        assert!(!pool.is_fresh());
    }
}
