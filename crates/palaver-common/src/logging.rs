//! Structured logging infrastructure for Palaver

use crate::error::PalaverError;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "palaver_engine=debug")
    pub level: String,
    /// Whether to emit one JSON object per event
    pub json_format: bool,
    /// Whether to use the multi-line pretty formatter
    pub pretty_format: bool,
    /// Optional file path; the file is rotated daily
    pub file_path: Option<PathBuf>,
    /// Whether to include target module information
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            pretty_format: false,
            file_path: None,
            include_targets: true,
        }
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// `RUST_LOG` takes precedence over `config.level`. When logging to a file the
/// returned guard must be held until shutdown so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, PalaverError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            PalaverError::config_with_source(format!("Invalid log filter '{}'", config.level), e)
        })?;

    let (writer, guard) = match &config.file_path {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                PalaverError::config(format!("Log path '{}' has no file name", path.display()))
            })?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };
    let ansi = config.file_path.is_none();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json_format {
        fmt::layer()
            .json()
            .with_target(config.include_targets)
            .with_writer(writer)
            .boxed()
    } else if config.pretty_format {
        fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_target(config.include_targets)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_target(config.include_targets)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| PalaverError::config_with_source("Failed to install tracing subscriber", e))?;

    Ok(guard)
}
