//! Core configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DisplayConfig, WriterConfig};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directives (e.g., "info", "debug,reqwest=warn")
    pub level: String,

    /// Output format
    pub format: Format,

    /// Output writer
    pub writer: WriterConfig,

    /// Display options
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            writer: WriterConfig::Stderr,
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Replace the filter with a single level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level.to_string();
        self
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human-readable
    Pretty,
    /// Single line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Level for a `-v` count on top of a base level; each step is one
    /// level more verbose, bottoming out at trace.
    pub fn more_verbose(self, steps: u8) -> Self {
        let levels = [
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ];
        let at = levels.iter().position(|l| *l == self).unwrap_or(2);
        levels[(at + steps as usize).min(levels.len() - 1)]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Trace => write!(f, "trace"),
            Level::Debug => write!(f, "debug"),
            Level::Info => write!(f, "info"),
            Level::Warn => write!(f, "warn"),
            Level::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Level::Info, 0, Level::Info)]
    #[case(Level::Info, 1, Level::Debug)]
    #[case(Level::Info, 2, Level::Trace)]
    #[case(Level::Warn, 9, Level::Trace)]
    fn test_more_verbose(#[case] base: Level, #[case] steps: u8, #[case] expected: Level) {
        assert_eq!(base.more_verbose(steps), expected);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert_eq!("pretty".parse::<Format>(), Ok(Format::Pretty));
        assert!("logfmt".parse::<Format>().is_err());
    }

    #[test]
    fn test_with_level() {
        let config = Config::default().with_level(Level::Debug);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config = serde_json::from_str(r#"{"level": "warn,rotator=debug"}"#).unwrap();
        assert_eq!(config.level, "warn,rotator=debug");
        assert_eq!(config.format, Format::Compact);
        assert_eq!(config.writer, WriterConfig::Stderr);
    }
}
