//! Configuration infrastructure
//!
//! Contains configuration loading and management for the archiver.
//!
//! Configuration is layered in three tiers, later tiers winning:
//! 1. Built-in defaults (`defaults` module)
//! 2. An optional config file (TOML/JSON/YAML, picked by extension)
//! 3. `PALACE_ARCHIVER__*` environment variables (e.g. `PALACE_ARCHIVER__ACQUISITION__MAX_ATTEMPTS=5`)

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::domain::constants::site;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PALACE_ARCHIVER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArchiverConfig {
    pub site: SiteConfig,
    pub http: HttpConfig,
    pub acquisition: AcquisitionConfig,
    pub harvest: HarvestConfig,
    pub metadata: MetadataConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Origin site settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Base URL every endpoint path is resolved against
    pub base_url: String,

    /// User agent sent with every request
    pub user_agent: String,
}

/// Per-session HTTP behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Overall timeout for one request, in seconds
    pub request_timeout_secs: u64,

    /// Connect timeout, in seconds
    pub connect_timeout_secs: u64,

    /// Rate limit applied to each session independently
    pub max_requests_per_second: u32,
}

/// CAPTCHA retry loop and pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Solve/validate/fetch cycles per image before giving up
    pub max_attempts: u32,

    /// Fixed pause after a failed attempt, in milliseconds
    pub retry_backoff_ms: u64,

    /// Pause between images of the same item, in milliseconds
    pub image_pause_ms: u64,

    /// Pause between items, in milliseconds
    pub item_pause_ms: u64,

    /// Pause after an item failed unexpectedly, in milliseconds
    pub item_error_pause_ms: u64,
}

/// URL harvesting crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Catalog `RegisterType` to enumerate
    pub category: String,

    /// Results per search page
    pub page_size: u32,

    /// Pause between search pages, in milliseconds
    pub page_pause_ms: u64,

    /// Pause after a failed search page, in milliseconds
    pub page_error_pause_ms: u64,
}

/// Metadata scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Pause between detail pages, in milliseconds
    pub request_pause_ms: u64,
}

/// Output layout, relative paths resolved against `output_root`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub output_root: PathBuf,
    pub urls_file: PathBuf,
    pub gallery_dir: PathBuf,
    pub main_image_dir: PathBuf,
    pub failed_images_log: PathBuf,
    pub failed_main_images_log: PathBuf,
    pub metadata_json_dir: PathBuf,
    pub metadata_csv: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; relative paths resolve against `output_root`
    pub log_dir: PathBuf,

    /// Log file name
    pub file_name: String,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

/// Default configuration values
pub mod defaults {
    pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
    pub const CONNECT_TIMEOUT_SECS: u64 = 15;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;

    /// OCR misses dominate failures, so attempts are generous and the backoff flat
    pub const MAX_ATTEMPTS: u32 = 10;
    pub const RETRY_BACKOFF_MS: u64 = 2000;
    pub const IMAGE_PAUSE_MS: u64 = 1000;
    pub const ITEM_PAUSE_MS: u64 = 3000;
    pub const ITEM_ERROR_PAUSE_MS: u64 = 5000;

    pub const HARVEST_CATEGORY: &str = "繪畫";
    pub const HARVEST_PAGE_SIZE: u32 = 30;
    pub const HARVEST_PAGE_PAUSE_MS: u64 = 1000;
    pub const HARVEST_PAGE_ERROR_PAUSE_MS: u64 = 5000;

    pub const METADATA_REQUEST_PAUSE_MS: u64 = 1000;

    pub const OUTPUT_ROOT: &str = "output";
    pub const URLS_FILE: &str = "urls.txt";
    pub const GALLERY_DIR: &str = "taipei_museum_artifacts";
    pub const MAIN_IMAGE_DIR: &str = "main_images";
    pub const FAILED_IMAGES_LOG: &str = "failed_images.log";
    pub const FAILED_MAIN_IMAGES_LOG: &str = "failed_main_images.log";
    pub const METADATA_JSON_DIR: &str = "metadata_json";
    pub const METADATA_CSV: &str = "metadata.csv";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_NAME: &str = "palace-archiver.log";
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: site::BASE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            image_pause_ms: defaults::IMAGE_PAUSE_MS,
            item_pause_ms: defaults::ITEM_PAUSE_MS,
            item_error_pause_ms: defaults::ITEM_ERROR_PAUSE_MS,
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            category: defaults::HARVEST_CATEGORY.to_string(),
            page_size: defaults::HARVEST_PAGE_SIZE,
            page_pause_ms: defaults::HARVEST_PAGE_PAUSE_MS,
            page_error_pause_ms: defaults::HARVEST_PAGE_ERROR_PAUSE_MS,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            request_pause_ms: defaults::METADATA_REQUEST_PAUSE_MS,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(defaults::OUTPUT_ROOT),
            urls_file: PathBuf::from(defaults::URLS_FILE),
            gallery_dir: PathBuf::from(defaults::GALLERY_DIR),
            main_image_dir: PathBuf::from(defaults::MAIN_IMAGE_DIR),
            failed_images_log: PathBuf::from(defaults::FAILED_IMAGES_LOG),
            failed_main_images_log: PathBuf::from(defaults::FAILED_MAIN_IMAGES_LOG),
            metadata_json_dir: PathBuf::from(defaults::METADATA_JSON_DIR),
            metadata_csv: PathBuf::from(defaults::METADATA_CSV),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "warn".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "error".to_string());
                filters.insert("selectors".to_string(), "error".to_string());
                filters
            },
        }
    }
}

impl HttpConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl AcquisitionConfig {
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub const fn image_pause(&self) -> Duration {
        Duration::from_millis(self.image_pause_ms)
    }

    pub const fn item_pause(&self) -> Duration {
        Duration::from_millis(self.item_pause_ms)
    }

    pub const fn item_error_pause(&self) -> Duration {
        Duration::from_millis(self.item_error_pause_ms)
    }

    /// No pauses at all; handy for tests and dry runs against a local mirror
    pub fn without_pauses(mut self) -> Self {
        self.retry_backoff_ms = 0;
        self.image_pause_ms = 0;
        self.item_pause_ms = 0;
        self.item_error_pause_ms = 0;
        self
    }
}

impl HarvestConfig {
    pub const fn page_pause(&self) -> Duration {
        Duration::from_millis(self.page_pause_ms)
    }

    pub const fn page_error_pause(&self) -> Duration {
        Duration::from_millis(self.page_error_pause_ms)
    }
}

impl MetadataConfig {
    pub const fn request_pause(&self) -> Duration {
        Duration::from_millis(self.request_pause_ms)
    }
}

impl PathsConfig {
    fn under_root(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_root.join(path)
        }
    }

    pub fn urls_file(&self) -> PathBuf {
        self.under_root(&self.urls_file)
    }

    pub fn gallery_dir(&self) -> PathBuf {
        self.under_root(&self.gallery_dir)
    }

    pub fn main_image_dir(&self) -> PathBuf {
        self.under_root(&self.main_image_dir)
    }

    pub fn failed_images_log(&self) -> PathBuf {
        self.under_root(&self.failed_images_log)
    }

    pub fn failed_main_images_log(&self) -> PathBuf {
        self.under_root(&self.failed_main_images_log)
    }

    pub fn metadata_json_dir(&self) -> PathBuf {
        self.under_root(&self.metadata_json_dir)
    }

    pub fn metadata_csv(&self) -> PathBuf {
        self.under_root(&self.metadata_csv)
    }

    pub fn log_dir(&self, logging: &LoggingConfig) -> PathBuf {
        self.under_root(&logging.log_dir)
    }
}

impl ArchiverConfig {
    /// Load defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        if let Some(path) = path {
            info!("Loaded configuration from: {:?}", path);
        }
        Ok(config)
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "acquisition.max_attempts must be greater than 0".to_string(),
            });
        }

        if self.http.max_requests_per_second == 0 {
            return Err(ConfigError::Validation {
                message: "http.max_requests_per_second must be greater than 0".to_string(),
            });
        }

        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "http.request_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.harvest.page_size == 0 {
            return Err(ConfigError::Validation {
                message: "harvest.page_size must be greater than 0".to_string(),
            });
        }

        url::Url::parse(&self.site.base_url).map_err(|e| ConfigError::Validation {
            message: format!("site.base_url '{}' is not a valid URL: {}", self.site.base_url, e),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_designed_retry_budget() {
        let config = ArchiverConfig::default();
        assert_eq!(config.acquisition.max_attempts, 10);
        assert_eq!(config.acquisition.retry_backoff(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = ArchiverConfig::default();
        config.acquisition.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut config = ArchiverConfig::default();
        config.site.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[acquisition]\nmax_attempts = 3\n\n[paths]\noutput_root = \"/tmp/archive\"").unwrap();

        let config = ArchiverConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.acquisition.max_attempts, 3);
        assert_eq!(config.acquisition.retry_backoff_ms, defaults::RETRY_BACKOFF_MS);
        assert_eq!(config.paths.urls_file(), PathBuf::from("/tmp/archive/urls.txt"));
    }

    #[test]
    fn absolute_paths_are_not_rebased() {
        let mut paths = PathsConfig::default();
        paths.failed_images_log = PathBuf::from("/var/log/failed.log");
        assert_eq!(paths.failed_images_log(), PathBuf::from("/var/log/failed.log"));
        assert_eq!(paths.gallery_dir(), PathBuf::from("output/taipei_museum_artifacts"));
    }
}
