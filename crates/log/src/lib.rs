//! Rotator Log - logging setup over `tracing`
//!
//! One place that turns a [`Config`] into an installed subscriber: an
//! `EnvFilter`, a pretty, compact or JSON formatter, and a stderr, stdout or
//! (rolling) file writer.
//!
//! ```no_run
//! # fn main() -> Result<(), rotator_log::LogError> {
//! let config = rotator_log::Config::default().overlay_env();
//! let _guard = rotator_log::init_with(config)?;
//! tracing::info!("rotator starting");
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod builder;
mod config;
mod writer;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format, Level, Rolling, WriterConfig};

/// Logging setup errors
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid logging configuration: {0}")]
    Config(String),

    #[error("invalid filter '{directives}': {reason}")]
    Filter { directives: String, reason: String },

    #[error("failed to open log output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install logger: {0}")]
    Init(String),
}

/// Result type for logging setup
pub type LogResult<T> = Result<T, LogError>;

/// Install a subscriber built from `config`.
///
/// Fails with [`LogError::Init`] if a global subscriber is already set.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
