use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General application settings
    pub app: AppConfig,

    /// Proxy rotation settings
    pub proxy: ProxyConfig,

    /// Retry policy for transcript fetching
    pub retry: RetryConfig,

    /// Local cache settings
    pub cache: CacheConfig,

    /// YouTube Data API settings
    pub youtube: YoutubeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Language codes tried in priority order when none are given on the CLI
    pub default_languages: Vec<String>,
}

/// How outbound proxies are obtained, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Fetch a proxy list from the Webshare API and rotate through it
    Api,
    /// Single statically configured proxy
    Manual,
    /// Numbered residential proxies rotated by username suffix
    Rotating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route transcript fetches through proxies
    pub enabled: bool,

    /// Rotation strategy
    pub mode: ProxyMode,

    /// Webshare API key (overridden by WEBSHARE_API_KEY)
    pub webshare_api_key: Option<String>,

    /// How long a fetched proxy list stays valid, in minutes
    pub list_cache_minutes: i64,

    /// Pick proxies round-robin or at random (api mode)
    pub selection: ProxySelection,

    /// Manual single-proxy settings (manual mode)
    pub manual: Option<ProxyEndpointConfig>,

    /// Numbered residential proxy settings (rotating mode)
    pub rotating: Option<RotatingProxyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxySelection {
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEndpointConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatingProxyConfig {
    pub host: String,
    pub port: u16,

    /// Base username; a numeric suffix is appended per request
    pub username: String,
    pub password: String,

    /// Number of numbered endpoints available
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before giving up on a transcript fetch
    pub max_attempts: u32,

    /// Pause between attempts, in seconds
    pub backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache lookups/writes are skipped entirely when false
    pub enabled: bool,

    /// SQLite database path (defaults under the platform data directory)
    pub db_path: Option<PathBuf>,

    /// Age threshold used by `cache purge` when no --days is given
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    /// YouTube Data API v3 key (overridden by YOUTUBE_API_KEY)
    pub api_key: String,

    /// Delay between paginated Data API requests, in milliseconds
    pub request_delay_ms: u64,

    /// Hard ceiling on videos fetched per channel
    pub max_videos: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            proxy: ProxyConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            youtube: YoutubeConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_languages: vec!["bn".to_string(), "en".to_string(), "hi".to_string()],
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ProxyMode::Api,
            webshare_api_key: None,
            list_cache_minutes: 60,
            selection: ProxySelection::RoundRobin,
            manual: None,
            rotating: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_secs: 1,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            retention_days: 30,
        }
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            request_delay_ms: 300,
            max_videos: 200,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;
            config
        } else {
            let config = Self::default();
            config.save().await?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("transcript-collector").join("config.yaml"))
    }

    /// Secrets can live outside the config file
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("WEBSHARE_API_KEY") {
            if !key.is_empty() {
                self.proxy.webshare_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("YOUTUBE_API_KEY") {
            if !key.is_empty() {
                self.youtube.api_key = key;
            }
        }
        if let Ok(flag) = std::env::var("USE_PROXY") {
            self.proxy.enabled = flag.eq_ignore_ascii_case("true");
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.proxy.enabled {
            match self.proxy.mode {
                ProxyMode::Api => {
                    if self.proxy.webshare_api_key.is_none() {
                        anyhow::bail!(
                            "Proxy mode 'api' requires webshare_api_key (or WEBSHARE_API_KEY)"
                        );
                    }
                }
                ProxyMode::Manual => {
                    if self.proxy.manual.is_none() {
                        anyhow::bail!("Proxy mode 'manual' requires the proxy.manual section");
                    }
                }
                ProxyMode::Rotating => match &self.proxy.rotating {
                    None => anyhow::bail!("Proxy mode 'rotating' requires the proxy.rotating section"),
                    Some(rotating) if rotating.pool_size == 0 => {
                        anyhow::bail!("proxy.rotating.pool_size must be at least 1")
                    }
                    _ => {}
                },
            }
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.cache.retention_days <= 0 {
            anyhow::bail!("cache.retention_days must be positive");
        }

        Ok(())
    }

    /// Resolved SQLite database path
    pub fn cache_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.cache.db_path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir().context("Could not determine data directory")?;
        Ok(data_dir.join("transcript-collector").join("cache.sqlite"))
    }

    /// Where the fetched proxy list is persisted between runs
    pub fn proxy_cache_path(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().context("Could not determine cache directory")?;
        Ok(cache_dir.join("transcript-collector").join("proxy_cache.json"))
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Default Languages: {}", self.app.default_languages.join(", "));
        println!("  Proxy Enabled: {}", self.proxy.enabled);
        if self.proxy.enabled {
            println!("  Proxy Mode: {:?}", self.proxy.mode);
        }
        println!("  Max Attempts: {}", self.retry.max_attempts);
        println!("  Cache Enabled: {}", self.cache.enabled);
        println!("  Cache Retention: {} days", self.cache.retention_days);
        println!(
            "  YouTube API Key: {}",
            if self.youtube.api_key.is_empty() { "(not set)" } else { "(set)" }
        );
    }
}
