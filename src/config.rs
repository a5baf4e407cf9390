//! Configuration types for debridarr

use crate::error::{Error, Result};
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Folder layout: where descriptors appear, where arrivals are synced, where
/// delivered files go
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the request descriptor folders; one sub-folder per category
    /// (`ARR_TORRENTS_PATH`)
    pub descriptor_root: PathBuf,

    /// Root of the delivery folders; one sub-folder per category
    /// (`ARR_DOWNLOAD_PATH`)
    pub download_root: PathBuf,

    /// Root of the externally synchronized arrival tree (`RCLONE_PATH`)
    pub arrival_root: PathBuf,

    /// Also watch the arrival tree for create events to wake the reconciler
    /// early (default: false; many sync mounts do not emit events)
    #[serde(default)]
    pub watch_arrivals: bool,
}

/// Acquisition service (Real-Debrid) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// REST base URL (default: "https://api.real-debrid.com/rest/1.0")
    #[serde(default = "default_acquisition_url")]
    pub api_url: String,

    /// Bearer token (`RD_APITOKEN`)
    #[serde(default)]
    pub api_token: String,

    /// Delay between status polls (default: 10 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Per-request HTTP timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            api_url: default_acquisition_url(),
            api_token: String::new(),
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Upstream catalog (Sonarr/Radarr) connection settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Whether this category is served at all (`SONARR` / `RADARR`)
    #[serde(default)]
    pub enabled: bool,

    /// Base URL, e.g. "http://localhost:7878"
    #[serde(default)]
    pub url: String,

    /// API key sent as `X-Api-Key`
    #[serde(default)]
    pub api_key: String,

    /// Number of history records searched for the failed release (default: 50)
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

/// Per-category catalog settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogsConfig {
    /// Sonarr (TV)
    #[serde(default)]
    pub sonarr: CatalogConfig,

    /// Radarr (movies)
    #[serde(default)]
    pub radarr: CatalogConfig,
}

impl CatalogsConfig {
    /// Settings for one category
    pub fn get(&self, category: Category) -> &CatalogConfig {
        match category {
            Category::Sonarr => &self.sonarr,
            Category::Radarr => &self.radarr,
        }
    }

    /// Categories whose catalog is enabled
    pub fn enabled_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.get(*c).enabled)
            .collect()
    }
}

/// Reconciliation worker timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Fixed delay between cycles (default: 5 seconds)
    #[serde(default = "default_idle_delay", with = "duration_serde")]
    pub idle_delay: Duration,

    /// How long an entry may wait for its arrival (default: 1 hour)
    #[serde(default = "default_match_timeout", with = "duration_serde")]
    pub match_timeout: Duration,

    /// Interval between periodic queue snapshots (default: 60 seconds)
    #[serde(default = "default_snapshot_interval", with = "duration_serde")]
    pub snapshot_interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            idle_delay: default_idle_delay(),
            match_timeout: default_match_timeout(),
            snapshot_interval: default_snapshot_interval(),
        }
    }
}

/// Transfer engine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Copy chunk size in bytes (default: 16 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Total copy attempts before giving up (`MAX_RETRIES`, default: 3)
    #[serde(default = "default_transfer_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (default: 2 seconds)
    #[serde(default = "default_transfer_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_transfer_attempts(),
            retry_delay: default_transfer_retry_delay(),
        }
    }
}

impl TransferConfig {
    /// Retry policy equivalent to "fixed delay, `max_attempts` total tries"
    pub fn retry_policy(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.saturating_sub(1),
            initial_delay: self.retry_delay,
            max_delay: self.retry_delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Descriptor intake settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Attempts to delete a consumed descriptor (default: 5)
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    /// Delay between deletion attempts (default: 1 second)
    #[serde(default = "default_delete_delay", with = "duration_serde")]
    pub delete_delay: Duration,

    /// Wait before reading a freshly created descriptor (default: 100 ms)
    #[serde(default = "default_settle_delay", with = "duration_millis_serde")]
    pub settle_delay: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            delete_attempts: default_delete_attempts(),
            delete_delay: default_delete_delay(),
            settle_delay: default_settle_delay(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./debridarr.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the bridge
///
/// Fields are organized into sub-configs:
/// - [`paths`](PathsConfig): descriptor, download and arrival roots
/// - [`acquisition`](AcquisitionConfig): Real-Debrid access and polling
/// - [`catalogs`](CatalogsConfig): Sonarr/Radarr access
/// - [`reconcile`](ReconcileConfig): worker timing
/// - [`transfer`](TransferConfig): copy chunking and retry
/// - [`intake`](IntakeConfig): descriptor consumption
/// - [`persistence`](PersistenceConfig): database location
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Folder layout
    pub paths: PathsConfig,

    /// Acquisition service settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Upstream catalogs
    #[serde(default)]
    pub catalogs: CatalogsConfig,

    /// Reconciliation worker timing
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Transfer engine settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Descriptor intake settings
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Variables not set keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Config::default();

        if let Some(v) = var("ARR_TORRENTS_PATH") {
            config.paths.descriptor_root = PathBuf::from(v);
        }
        if let Some(v) = var("ARR_DOWNLOAD_PATH") {
            config.paths.download_root = PathBuf::from(v);
        }
        if let Some(v) = var("RCLONE_PATH") {
            config.paths.arrival_root = PathBuf::from(v);
        }
        if let Some(v) = var("WATCH_RCLONE") {
            config.paths.watch_arrivals = parse_flag(&v);
        }

        if let Some(v) = var("RD_APITOKEN") {
            config.acquisition.api_token = v;
        }
        if let Some(v) = var("RD_API_URL") {
            config.acquisition.api_url = v;
        }
        if let Some(secs) = parse_secs(var("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS")? {
            config.acquisition.poll_interval = secs;
        }

        for category in Category::ALL {
            let prefix = category.as_str().to_uppercase();
            let catalog = match category {
                Category::Sonarr => &mut config.catalogs.sonarr,
                Category::Radarr => &mut config.catalogs.radarr,
            };
            if let Some(v) = var(&prefix) {
                catalog.enabled = parse_flag(&v);
            }
            if let Some(v) = var(&format!("{prefix}_URL")) {
                catalog.url = v;
            }
            if let Some(v) = var(&format!("{prefix}_API_KEY")) {
                catalog.api_key = v;
            }
        }

        if let Some(secs) = parse_secs(var("RECONCILE_INTERVAL_SECS"), "RECONCILE_INTERVAL_SECS")? {
            config.reconcile.idle_delay = secs;
        }
        if let Some(secs) = parse_secs(var("MATCH_TIMEOUT_SECS"), "MATCH_TIMEOUT_SECS")? {
            config.reconcile.match_timeout = secs;
        }
        if let Some(secs) = parse_secs(var("SNAPSHOT_INTERVAL_SECS"), "SNAPSHOT_INTERVAL_SECS")? {
            config.reconcile.snapshot_interval = secs;
        }

        if let Some(v) = var("MAX_RETRIES") {
            config.transfer.max_attempts = v
                .trim()
                .parse()
                .map_err(|_| Error::config("MAX_RETRIES", format!("not a number: {v}")))?;
        }

        if let Some(v) = var("DATABASE_PATH") {
            config.persistence.database_path = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can run
    pub fn validate(&self) -> Result<()> {
        if self.paths.descriptor_root.as_os_str().is_empty() {
            return Err(Error::config(
                "ARR_TORRENTS_PATH",
                "descriptor root is not set",
            ));
        }
        if self.paths.download_root.as_os_str().is_empty() {
            return Err(Error::config("ARR_DOWNLOAD_PATH", "download root is not set"));
        }
        if self.paths.arrival_root.as_os_str().is_empty() {
            return Err(Error::config("RCLONE_PATH", "arrival root is not set"));
        }
        if self.acquisition.api_token.trim().is_empty() {
            return Err(Error::config("RD_APITOKEN", "Real-Debrid API token is not set"));
        }
        url::Url::parse(&self.acquisition.api_url)
            .map_err(|e| Error::config("RD_API_URL", format!("invalid URL: {e}")))?;

        let enabled = self.catalogs.enabled_categories();
        if enabled.is_empty() {
            return Err(Error::config(
                "SONARR",
                "no category enabled; set SONARR and/or RADARR",
            ));
        }
        for category in enabled {
            let prefix = category.as_str().to_uppercase();
            let catalog = self.catalogs.get(category);
            url::Url::parse(&catalog.url).map_err(|e| {
                Error::config(format!("{prefix}_URL"), format!("invalid URL: {e}"))
            })?;
            if catalog.api_key.trim().is_empty() {
                return Err(Error::config(
                    format!("{prefix}_API_KEY"),
                    format!("{category} is enabled but has no API key"),
                ));
            }
        }

        if self.reconcile.idle_delay.is_zero() {
            return Err(Error::config(
                "RECONCILE_INTERVAL_SECS",
                "idle delay must be greater than zero",
            ));
        }
        if self.transfer.max_attempts == 0 {
            return Err(Error::config("MAX_RETRIES", "at least one attempt is required"));
        }
        if self.transfer.chunk_size == 0 {
            return Err(Error::config("chunk_size", "chunk size must be greater than zero"));
        }

        Ok(())
    }

    /// Descriptor folder of a category
    pub fn descriptor_folder(&self, category: Category) -> PathBuf {
        self.paths.descriptor_root.join(category.as_str())
    }

    /// Delivery folder of a category
    pub fn download_folder(&self, category: Category) -> PathBuf {
        self.paths.download_root.join(category.as_str())
    }
}

/// Interpret an environment flag the permissive way: anything non-empty that
/// isn't an explicit "off" value enables it
fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

fn parse_secs(value: Option<String>, key: &str) -> Result<Option<Duration>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::config(key, format!("not a number of seconds: {v}")))
        })
        .transpose()
}

fn default_acquisition_url() -> String {
    "https://api.real-debrid.com/rest/1.0".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_history_page_size() -> u32 {
    50
}

fn default_idle_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_match_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_snapshot_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_chunk_size() -> usize {
    16 * 1024 * 1024
}

fn default_transfer_attempts() -> u32 {
    3
}

fn default_transfer_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_delete_attempts() -> u32 {
    5
}

fn default_delete_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./debridarr.db")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
