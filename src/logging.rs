//! Structured logging setup. Logs go to stderr so stdout stays parseable.

use std::io;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("logger already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub with_targets: bool,
    pub with_thread_names: bool,
    pub use_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        // Dev logs are suppressed in release builds.
        let level = if cfg!(debug_assertions) { "debug" } else { "warn" };
        Self {
            level: level.to_string(),
            with_targets: false,
            with_thread_names: true,
            use_color: false,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `cfg.level`.
pub fn init(cfg: &LogConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|_| LoggingError::InvalidLogLevel(cfg.level.clone()))?,
    };
    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_thread_names(cfg.with_thread_names);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_initialized() {
        let cfg = LogConfig {
            level: "off".to_string(),
            ..LogConfig::default()
        };
        // Another test may have won the race; either way the second call fails.
        let _ = init(&cfg);
        assert!(matches!(init(&cfg), Err(LoggingError::AlreadyInitialized)));
    }

    #[test]
    fn default_level_follows_build_profile() {
        let cfg = LogConfig::default();
        if cfg!(debug_assertions) {
            assert_eq!(cfg.level, "debug");
        } else {
            assert_eq!(cfg.level, "warn");
        }
    }
}
