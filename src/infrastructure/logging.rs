//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - Console and/or file output
//! - Configuration based log level control, overridable through `RUST_LOG`
//! - Structured JSON file logging (optional)
//! - Local-time timestamps

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Local;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Subscriber, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the log file writer alive
static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// Timestamps in the machine's local timezone
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Build the level filter from configuration.
///
/// Dependency targets are quieted unless the level is `trace`.
///
/// ```bash
/// # Show detailed HTTP logs
/// RUST_LOG="debug,reqwest=debug,hyper=debug" palace-archiver download
/// ```
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            let directive = format!("{}={}", module, level)
                .parse()
                .map_err(|e| anyhow!("Invalid log filter for '{}': {}", module, e))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// stderr layer; typed per subscriber stack so each branch builds its own
fn console_layer<S>(enabled: bool) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    enabled.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    })
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig, log_dir: &Path) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let registry = Registry::default().with(env_filter);

    match (config.file_output, config.console_output) {
        (false, false) => return Err(anyhow!("No logging output configured")),
        (false, true) => {
            registry.with(console_layer(true)).try_init()?;
        }
        (true, _) => {
            std::fs::create_dir_all(log_dir)
                .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

            let file_appender = rolling::never(log_dir, &config.file_name);
            let (file_writer, file_guard) = non_blocking(file_appender);

            // Store the guard globally to prevent it from being dropped
            LOG_GUARDS
                .lock()
                .map_err(|_| anyhow!("Log guard registry poisoned"))?
                .push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(LocalTimeFormatter)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false);
                registry
                    .with(file_layer)
                    .with(console_layer(config.console_output))
                    .try_init()?;
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(LocalTimeFormatter)
                    .with_target(false)
                    .with_ansi(false);
                registry
                    .with(file_layer)
                    .with(console_layer(config.console_output))
                    .try_init()?;
            }
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {:?}", log_dir.join(&config.file_name));
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Palace Archiver System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("==========================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(config.file_output);
    }

    #[test]
    fn invalid_module_filter_is_reported() {
        let mut config = LoggingConfig::default();
        config.module_filters.insert("reqwest".into(), "loud".into());
        // RUST_LOG would bypass the configured filters entirely
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_env_filter(&config).is_err());
        }
    }

    #[test]
    fn no_output_is_an_error() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(init_logging_with_config(&config, dir.path()).is_err());
    }

    // The only test in this binary that installs the global subscriber
    #[test]
    fn file_and_console_output_install_together() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            console_output: true,
            file_output: true,
            json_format: true,
            ..LoggingConfig::default()
        };

        init_logging_with_config(&config, dir.path()).unwrap();
        assert!(dir.path().join(&config.file_name).exists());

        // a second global subscriber is refused
        assert!(init_logging_with_config(&config, dir.path()).is_err());
    }
}
