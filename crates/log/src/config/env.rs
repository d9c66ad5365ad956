//! Environment overrides

use super::{Config, DisplayConfig};

impl Config {
    /// Apply the process environment on top of this configuration.
    ///
    /// `ROTATOR_LOG` (falling back to `RUST_LOG`) replaces the filter and
    /// `ROTATOR_LOG_FORMAT` the format; see also the [`DisplayConfig`] flags.
    /// Unset variables leave the configured values alone.
    #[must_use]
    pub fn overlay_env(self) -> Self {
        self.overlay_vars(|name| std::env::var(name).ok())
    }

    /// [`overlay_env`](Self::overlay_env) over an arbitrary variable lookup.
    #[must_use]
    pub fn overlay_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(level) = var("ROTATOR_LOG").or_else(|| var("RUST_LOG")) {
            self.level = level;
        }
        // An unknown format name keeps the configured one.
        if let Some(format) = var("ROTATOR_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.format = format;
        }
        self.display.apply_vars(&var);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Format;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn configured() -> Config {
        Config {
            level: "warn".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                time: true,
                source: false,
                colors: true,
                ..DisplayConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_rotator_log_wins_over_rust_log() {
        let config = configured().overlay_vars(vars(&[("ROTATOR_LOG", "debug"), ("RUST_LOG", "trace")]));
        assert_eq!(config.level, "debug");

        let config = configured().overlay_vars(vars(&[("RUST_LOG", "trace")]));
        assert_eq!(config.level, "trace");
    }

    #[test]
    fn test_unset_variables_keep_configured_values() {
        let config = configured().overlay_vars(vars(&[]));
        assert_eq!(config, configured());
    }

    #[test]
    fn test_format_and_display_flags() {
        let config = configured().overlay_vars(vars(&[
            ("ROTATOR_LOG_FORMAT", "json"),
            ("ROTATOR_LOG_TIME", "0"),
            ("ROTATOR_LOG_COLORS", "false"),
            ("ROTATOR_LOG_SOURCE", "1"),
        ]));
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, Format::Json);
        assert!(!config.display.time);
        assert!(!config.display.colors);
        assert!(config.display.source);
    }

    #[test]
    fn test_unknown_format_keeps_configured_format() {
        let config = configured().overlay_vars(vars(&[("ROTATOR_LOG_FORMAT", "xml")]));
        assert_eq!(config.format, Format::Pretty);
    }
}
