//! Engine configuration.
//!
//! Defaults work out of the box; overrides come from an optional
//! `arxiv-harvest.toml` (current directory, then the platform config
//! directory) and from `ARXIV_HARVEST_*` environment variables, which
//! win over files.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::default_cache_dir;
use crate::client::ARXIV_API_URL;
use crate::download::DEFAULT_CONCURRENCY;
use crate::error::HarvestError;
use crate::transport::RetryPolicy;

const ENV_PREFIX: &str = "ARXIV_HARVEST";
const CONFIG_BASENAME: &str = "arxiv-harvest";

/// Tunable settings for the acquisition engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// arXiv query endpoint
    pub base_url: String,

    /// `max_results` applied to requests built through the engine
    pub default_max_results: usize,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Backoff cap in milliseconds
    pub retry_max_delay_ms: u64,

    /// Per-attempt timeout in seconds
    pub attempt_timeout_secs: u64,

    /// Simultaneous downloads (1..=100)
    pub max_concurrent_downloads: usize,

    /// Where PDFs land when no directory is passed explicitly
    pub download_dir: PathBuf,

    /// Search-result cache location; platform cache dir when unset
    pub cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in seconds
    pub cache_ttl_secs: u64,

    pub cache_enabled: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: ARXIV_API_URL.to_string(),
            default_max_results: 10,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            attempt_timeout_secs: 30,
            max_concurrent_downloads: DEFAULT_CONCURRENCY,
            download_dir: PathBuf::from("papers"),
            cache_dir: None,
            cache_ttl_secs: 3600,
            cache_enabled: true,
        }
    }
}

impl HarvestConfig {
    /// Load configuration from files and environment.
    pub fn load() -> Result<Self, HarvestError> {
        let mut builder = Config::builder();

        if let Some(config_dir) = dirs::config_dir() {
            let user_file = config_dir.join(CONFIG_BASENAME).join("config");
            builder = builder.add_source(
                File::with_name(&user_file.to_string_lossy()).required(false),
            );
        }

        let settings = builder
            .add_source(File::with_name(CONFIG_BASENAME).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| HarvestError::Validation(format!("configuration error: {}", e)))?;

        let config: HarvestConfig = settings
            .try_deserialize()
            .map_err(|e| HarvestError::Validation(format!("configuration error: {}", e)))?;

        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// The retry policy these settings describe
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Effective cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}
