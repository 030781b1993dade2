//! Tracing and logging setup shared by every binary and test harness.

/// Initialize process-wide logging with the defaults (`RUST_LOG`, JSON output).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init();
}

/// Initialize process-wide logging from explicit configuration.
pub fn init_with(config: &LogConfig) -> Result<(), ParseLogFilterError> {
    self::tracing::init_with(config)
}

pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, ParseLogFilterError, ParseLogFormatError, parse_filter};
