//! Logging
//!
//! Installs the global `tracing` subscriber. Output goes to stderr because
//! stdout carries the stdio transport.

use crate::config::{LogFormat, LogSettings};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Logging error types
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Build the filter: `RUST_LOG` wins, then the configured level
pub fn build_filter(settings: &LogSettings) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.level)
        .map_err(|_| LoggingError::InvalidFilter(settings.level.clone()))
}

/// Initialize logging with the given settings
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let env_filter = build_filter(settings)?;

    let result = match settings.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| LoggingError::InitError(e.to_string()))?;

    tracing::debug!(level = %settings.level, format = ?settings.format, "logging initialized");
    Ok(())
}
