//! Layered configuration: built-in defaults, then the TOML file, then
//! `ROTATOR_*` environment variables (`__` separates nested keys, e.g.
//! `ROTATOR_ROTATION__CHANGE_INTERVAL=12h`).

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use rotator_credential::RotatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Used when `--config` is not given; may be absent.
pub const DEFAULT_CONFIG: &str = "rotator.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub rotator: RotatorConfig,

    pub logging: rotator_log::Config,
}

impl CliConfig {
    /// Load and validate.
    ///
    /// An explicitly named file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => {
                anyhow::ensure!(path.is_file(), "config file {} not found", path.display());
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG),
        };

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&file))
                .merge(Env::prefixed("ROTATOR_").split("__")),
        )
        .with_context(|| format!("invalid configuration ({})", file.display()))
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment.extract()?;
        config.rotator.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn from_toml(toml: &str) -> anyhow::Result<CliConfig> {
        CliConfig::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(from_toml("").unwrap(), CliConfig::default());
    }

    #[test]
    fn test_sections_and_logging() {
        let config = from_toml(
            r#"
            [account]
            credential_file = "/etc/rotator/account.json"

            [rotation]
            change_interval = "12h"
            max_attempts_per_window = 5

            [password]
            length = 24
            use_special = false

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.rotator.account.credential_file,
            PathBuf::from("/etc/rotator/account.json")
        );
        assert_eq!(config.rotator.rotation.change_interval, Duration::from_secs(12 * 3600));
        assert_eq!(config.rotator.rotation.max_attempts_per_window, 5);
        assert_eq!(config.rotator.password.length, 24);
        assert!(!config.rotator.password.use_special);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, rotator_log::Format::Json);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = from_toml("[password]\nlength = 4").unwrap_err();
        assert!(
            err.downcast_ref::<rotator_credential::ConfigError>().is_some(),
            "{err:#}"
        );
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
