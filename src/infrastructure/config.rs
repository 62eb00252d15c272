//! Configuration infrastructure
//!
//! One [`AppConfig`] is built at process start and handed by reference to
//! every component. Values are layered:
//! 1. Built-in defaults (see [`defaults`])
//! 2. An optional TOML/JSON/YAML file
//! 3. Environment variables prefixed with `PRICE_TRACKER__`
//!    (e.g. `PRICE_TRACKER__STORE__URL`)
//!
//! Store credentials and the index name have no defaults. They must come
//! from the file or the environment.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::parsing::config::SelectorConfig;

/// Credential value that never shows up in logs or `Debug` output.
pub use secrecy::SecretString;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PRICE_TRACKER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("Missing required secret '{key}' (set it in the config file or PRICE_TRACKER__{env})")]
    MissingSecret { key: &'static str, env: &'static str },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub marketplace: MarketplaceConfig,
    pub crawl: CrawlConfig,
    pub store: StoreConfig,
    pub evaluator: EvaluatorConfig,
    pub catalog: CatalogConfig,
    pub csv: CsvConfig,
    pub logging: LoggingConfig,
    pub selectors: SelectorConfig,
}

/// Target marketplace and the constant request header set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Listing pages live at `{base_url}/{encoded term}`
    pub base_url: String,
    /// Used to resolve relative detail links and as Referer
    pub site_url: String,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub request_timeout_secs: u64,
    /// Cards considered per listing page; `None` takes all
    pub max_listings_per_term: Option<usize>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::MARKETPLACE_BASE_URL.to_string(),
            site_url: defaults::MARKETPLACE_SITE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            accept: defaults::ACCEPT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECONDS,
            max_listings_per_term: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// One term fully processed before the next, with a delay in between
    #[default]
    Sequential,
    /// Terms processed in parallel, gated by the per-host limiter
    Concurrent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Analytics store configured under `[store]`
    #[default]
    Store,
    /// In-process store; nothing leaves the process
    Memory,
    /// Append-only CSV file configured under `[csv]`
    Csv,
}

/// Crawl loop behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Fixed pause between terms in sequential mode
    pub request_delay_ms: u64,
    /// Random extra pause in `0..=jitter_ms`
    pub jitter_ms: u64,
    /// Minimum spacing between two requests to the same host
    pub per_host_interval_ms: u64,
    pub enrich_details: bool,
    pub concurrency: ConcurrencyMode,
    pub max_concurrent_terms: usize,
    pub max_concurrent_enrichments: usize,
    pub sink: SinkKind,
    /// Drop records whose price could not be extracted
    pub require_price: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: defaults::REQUEST_DELAY_MS,
            jitter_ms: 0,
            per_host_interval_ms: defaults::PER_HOST_INTERVAL_MS,
            enrich_details: true,
            concurrency: ConcurrencyMode::Sequential,
            max_concurrent_terms: defaults::MAX_CONCURRENT_TERMS,
            max_concurrent_enrichments: defaults::MAX_CONCURRENT_ENRICHMENTS,
            sink: SinkKind::Store,
            require_price: false,
        }
    }
}

/// Analytics store connection. `url` and `index` are required secrets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub index: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub api_key: Option<SecretString>,
    pub request_timeout_secs: u64,
    /// Documents per bulk request
    pub bulk_chunk_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            index: None,
            username: None,
            password: None,
            api_key: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECONDS,
            bulk_chunk_size: defaults::BULK_CHUNK_SIZE,
        }
    }
}

impl StoreConfig {
    /// Parsed base URL of the store.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingSecret { key: "store.url", env: "STORE__URL" })?;
        Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| ConfigError::validation(format!("store.url is not a valid URL: {e}")))
    }

    pub fn index_name(&self) -> Result<&str, ConfigError> {
        self.index
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .ok_or(ConfigError::MissingSecret { key: "store.index", env: "STORE__INDEX" })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Rows kept in every top-N table
    pub top_n: usize,
    /// Factor turning document counts into "estimated sales"
    pub sales_multiplier: f64,
    pub evolution_window_days: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            top_n: defaults::TOP_N,
            sales_multiplier: 1.0,
            evolution_window_days: defaults::EVOLUTION_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite URL of the product catalog, e.g. `sqlite://catalog.db`
    pub database_url: Option<String>,
}

/// CSV sink output location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Fixed output file; records are appended across runs
    pub path: Option<PathBuf>,
    /// Directory for timestamped files when `path` is unset
    pub directory: PathBuf,
    pub file_prefix: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            path: None,
            directory: PathBuf::from("."),
            file_prefix: defaults::CSV_FILE_PREFIX.to_string(),
        }
    }
}

impl CsvConfig {
    /// `path`, or `{directory}/{file_prefix}_{YYYYmmdd_HHMMSS}.csv`.
    pub fn output_path(&self, now: DateTime<Utc>) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => self
                .directory
                .join(format!("{}_{}.csv", self.file_prefix, now.format("%Y%m%d_%H%M%S"))),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output (stderr)
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to the platform data dir
    pub log_dir: Option<PathBuf>,

    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from an optional file plus the environment.
    ///
    /// Without an explicit path the platform config file is used when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Same sources as [`AppConfig::load`], for callers that adjust values
    /// before validating.
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                if let Some(default_path) = default_config_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Validate values and required secrets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = Url::parse(&self.marketplace.base_url)
            .map_err(|e| ConfigError::validation(format!("marketplace.base_url: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::validation("marketplace.base_url must be http(s)"));
        }
        Url::parse(&self.marketplace.site_url)
            .map_err(|e| ConfigError::validation(format!("marketplace.site_url: {e}")))?;

        if self.marketplace.request_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "marketplace.request_timeout_secs must be greater than 0",
            ));
        }
        if self.crawl.per_host_interval_ms == 0 {
            return Err(ConfigError::validation(
                "crawl.per_host_interval_ms must be greater than 0",
            ));
        }
        if self.crawl.concurrency == ConcurrencyMode::Concurrent
            && (self.crawl.max_concurrent_terms == 0 || self.crawl.max_concurrent_enrichments == 0)
        {
            return Err(ConfigError::validation("concurrency limits must be greater than 0"));
        }
        if self.evaluator.top_n == 0 {
            return Err(ConfigError::validation("evaluator.top_n must be greater than 0"));
        }
        if !self.evaluator.sales_multiplier.is_finite() || self.evaluator.sales_multiplier < 0.0 {
            return Err(ConfigError::validation(
                "evaluator.sales_multiplier must be a non-negative number",
            ));
        }
        if self.store.bulk_chunk_size == 0 {
            return Err(ConfigError::validation("store.bulk_chunk_size must be greater than 0"));
        }

        match self.crawl.sink {
            SinkKind::Store => {
                self.store.endpoint()?;
                self.store.index_name()?;
            }
            SinkKind::Csv if self.csv.path.is_none() && self.csv.file_prefix.trim().is_empty() => {
                return Err(ConfigError::validation("csv.file_prefix must not be empty"));
            }
            SinkKind::Csv | SinkKind::Memory => {}
        }
        Ok(())
    }
}

/// `<config dir>/price-tracker/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(defaults::APP_DIR_NAME).join("config.toml"))
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "price-tracker";

    /// Listing pages are `{MARKETPLACE_BASE_URL}/{term}`
    pub const MARKETPLACE_BASE_URL: &str = "https://lista.mercadolivre.com.br";

    pub const MARKETPLACE_SITE_URL: &str = "https://www.mercadolivre.com.br/";

    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

    pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

    pub const ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7";

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Default delay between terms in milliseconds
    pub const REQUEST_DELAY_MS: u64 = 1500;

    pub const PER_HOST_INTERVAL_MS: u64 = 1000;

    pub const MAX_CONCURRENT_TERMS: usize = 4;

    pub const MAX_CONCURRENT_ENRICHMENTS: usize = 4;

    pub const BULK_CHUNK_SIZE: usize = 500;

    pub const TOP_N: usize = 5;

    pub const EVOLUTION_WINDOW_DAYS: u32 = 30;

    pub const LOG_FILE_NAME: &str = "price-tracker.log";

    pub const CSV_FILE_PREFIX: &str = "price_tracker_results";
}
