//! Tracing/logging initialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output for local development.
    Pretty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log format '{0}' (expected 'json' or 'pretty')")]
pub struct ParseLogFormatError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid log filter '{directive}': {reason}")]
pub struct ParseLogFilterError {
    pub directive: String,
    pub reason: String,
}

/// Parse an `EnvFilter` directive, reporting malformed input instead of
/// replacing it.
pub fn parse_filter(directive: &str) -> Result<EnvFilter, ParseLogFilterError> {
    EnvFilter::try_new(directive).map_err(|e| ParseLogFilterError {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

impl core::str::FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ParseLogFormatError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive; `None` defers to `RUST_LOG`, then `info`.
    pub filter: Option<String>,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: None,
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    /// Check the explicit filter directive, if any.
    pub fn validate(&self) -> Result<(), ParseLogFilterError> {
        self.env_filter().map(|_| ())
    }

    fn env_filter(&self) -> Result<EnvFilter, ParseLogFilterError> {
        match &self.filter {
            Some(directive) => parse_filter(directive),
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter, LogFormat::default());
}

/// Initialize from explicit configuration. A malformed filter directive is
/// an error; nothing is installed.
pub fn init_with(config: &LogConfig) -> Result<(), ParseLogFilterError> {
    install(config.env_filter()?, config.format);
    Ok(())
}

fn install(filter: EnvFilter, format: LogFormat) {
    let _ = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .with_target(true)
            .try_init(),
    };
}
