//! Structured logging for the command-line tool.
//!
//! Logs go to stderr so that command output on stdout stays machine
//! readable. The library itself only emits `tracing` events; installing a
//! subscriber is left to the binary (or the embedding application).

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Filter directive override, e.g. `MINIVCS_LOG=minivcs=debug`.
pub const LOG_ENV: &str = "MINIVCS_LOG";
/// Output format override: `text` or `json`.
pub const LOG_FORMAT_ENV: &str = "MINIVCS_LOG_FORMAT";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log format '{0}' (must be 'json' or 'text')")]
    InvalidFormat(String),

    #[error("invalid log directive: {0}")]
    InvalidDirective(#[from] ParseError),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

impl Format {
    fn parse(value: &str) -> Result<Self, LoggingError> {
        match value {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

/// Install the global subscriber.
///
/// Priority order (highest to lowest):
/// 1. `MINIVCS_LOG` / `MINIVCS_LOG_FORMAT`
/// 2. `config`
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;

    let base_subscriber = Registry::default().with(filter);

    match format {
        Format::Json => base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        Format::Text => base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(&config.level)?)
}

fn determine_format(config: &LoggingConfig) -> Result<Format, LoggingError> {
    let from_env = std::env::var(LOG_FORMAT_ENV).ok();
    select_format(from_env.as_deref(), &config.format)
}

/// A set but unrecognized override is an error, not a fallback.
fn select_format(from_env: Option<&str>, configured: &str) -> Result<Format, LoggingError> {
    match from_env {
        Some(value) => Format::parse(value),
        None => Format::parse(configured),
    }
}
