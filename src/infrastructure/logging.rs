//! Logging system configuration and initialization
//!
//! Console output goes to stderr so that command results on stdout stay
//! machine readable. File output uses a non-blocking appender whose guard
//! lives for the whole process.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::ChronoUtc},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::defaults;

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Directory for log files: configured path, else `<data dir>/price-tracker/logs`.
pub fn log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(defaults::APP_DIR_NAME)
            .join("logs")
    })
}

/// Build the env filter. `RUST_LOG` wins over the configured level.
///
/// Below TRACE, chatty dependencies are held at warn/info so crawl progress
/// stays readable.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))?;
    if !level.to_lowercase().contains("trace") {
        for directive in [
            "sqlx::query=warn",
            "sqlx::sqlite=warn",
            "reqwest=info",
            "hyper=warn",
            "hyper_util=warn",
            "h2=warn",
            "html5ever=warn",
            "selectors=warn",
        ] {
            filter = filter.add_directive(directive.parse()?);
        }
        filter = filter.add_directive(format!("price_tracker_lib={level}").parse()?);
    }
    Ok(filter)
}

/// Initialize logging. Calling it again after a successful init is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INITIALIZED.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &LoggingConfig) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut log_file = None;

    if config.file_output {
        let log_dir = log_directory(config);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let (file_writer, file_guard) = non_blocking(rolling::never(&log_dir, &config.file_name));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer.json().with_target(true).boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
        log_file = Some(log_dir.join(&config.file_name));
    }

    if config.console_output {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
            .with_target(false);
        layers.push(if config.json_format {
            console_layer.json().boxed()
        } else {
            console_layer.boxed()
        });
    }

    if layers.is_empty() {
        return Err(anyhow!("No logging output configured"));
    }

    Registry::default()
        .with(build_filter(&config.level)?)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if let Some(path) = log_file {
        info!("Log file: {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn configured_log_dir_wins() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/var/log/price-tracker")),
            ..LoggingConfig::default()
        };
        assert_eq!(log_directory(&config), PathBuf::from("/var/log/price-tracker"));
    }

    #[test]
    fn default_log_dir_is_app_scoped() {
        let dir = log_directory(&LoggingConfig::default());
        assert!(dir.ends_with(PathBuf::from(defaults::APP_DIR_NAME).join("logs")));
    }

    #[test]
    fn invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(build_filter("info,price_tracker_lib=loud").is_err());
        }
    }

    #[test]
    fn trace_keeps_dependency_logs() {
        let filter = build_filter("trace").unwrap().to_string();
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(!filter.contains("sqlx::query=warn"));
        }
    }

    #[test]
    fn no_output_is_an_error() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(install(&config).is_err());
    }

    #[test]
    fn init_writes_to_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            console_output: false,
            file_output: true,
            log_dir: Some(dir.path().to_path_buf()),
            ..LoggingConfig::default()
        };

        init_logging(&config).unwrap();
        init_logging(&config).unwrap();
        assert!(dir.path().join(&config.file_name).exists());
    }
}
