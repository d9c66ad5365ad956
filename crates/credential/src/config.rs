//! Configuration types
//!
//! Every section deserializes with defaults, so an empty document is a valid
//! configuration. [`RotatorConfig::validate`] checks settings on their own;
//! [`RotatorConfig::preflight`] additionally checks them against the loaded
//! credential. Both run before the scheduler starts, so misconfiguration
//! never reaches the network.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::codegen::{CodeError, CodeGenerator, ConfirmationSigner, DEFAULT_DIGITS};
use crate::core::AccountCredential;
use crate::notify::NotificationConfig;
use crate::password::{PasswordConfig, PolicyError};
use crate::rotation::RetryPolicy;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A secret cannot drive code generation or signing
    #[error(transparent)]
    Code(#[from] CodeError),

    /// The password policy is unsatisfiable
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A setting is out of range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Where the account credential lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// JSON credential file, rewritten after every rotation
    pub credential_file: PathBuf,

    /// One-time code length
    pub code_digits: u32,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            credential_file: PathBuf::from("account.json"),
            code_digits: DEFAULT_DIGITS,
        }
    }
}

/// Scheduling, rate limiting and retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Time between successful rotations
    #[serde(with = "humantime_serde")]
    pub change_interval: Duration,

    /// Failures tolerated inside `rate_limit_window` before runs are refused
    pub max_attempts_per_window: u32,

    /// Trailing window for the failure count
    #[serde(with = "humantime_serde")]
    pub rate_limit_window: Duration,

    /// Minimum wait after a failed run before the scheduler tries again
    #[serde(with = "humantime_serde")]
    pub failure_retry_delay: Duration,

    /// How long a forced run waits for an in-progress one
    #[serde(with = "humantime_serde")]
    pub busy_grace: Duration,

    /// How long an in-flight remote call may continue after shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Backoff for transient remote errors
    pub retry: RetryPolicy,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            change_interval: Duration::from_secs(24 * 3600),
            max_attempts_per_window: 3,
            rate_limit_window: Duration::from_secs(3600),
            failure_retry_delay: Duration::from_secs(15 * 60),
            busy_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Rotation history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History log file; `<path>.lock` is the cross-process run gate
    pub path: PathBuf,

    /// Records retained before the oldest are evicted
    pub max_records: usize,

    /// Recent records whose passwords may not be reused
    pub max_password_history: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rotation_history.log"),
            max_records: 10,
            max_password_history: 10,
        }
    }
}

/// Remote account service endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://accounts.example.com/api`
    pub base_url: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Complete rotator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorConfig {
    pub account: AccountConfig,
    pub rotation: RotationConfig,
    pub password: PasswordConfig,
    pub history: HistoryConfig,
    pub remote: RemoteConfig,
    pub notifications: NotificationConfig,
}

impl RotatorConfig {
    /// Check every setting that does not depend on the credential.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.password.validate()?;

        if !(6..=8).contains(&self.account.code_digits) {
            return Err(CodeError::InvalidDigits(self.account.code_digits).into());
        }

        let rotation = &self.rotation;
        if rotation.change_interval.is_zero() {
            return Err(invalid("rotation.change_interval", "must be greater than zero"));
        }
        if rotation.rate_limit_window.is_zero() {
            return Err(invalid("rotation.rate_limit_window", "must be greater than zero"));
        }
        if rotation.max_attempts_per_window == 0 {
            return Err(invalid("rotation.max_attempts_per_window", "must be at least 1"));
        }
        if rotation.retry.max_attempts == 0 {
            return Err(invalid("rotation.retry.max_attempts", "must be at least 1"));
        }
        if rotation.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "rotation.retry.backoff_multiplier",
                format!("must be at least 1.0, got {}", rotation.retry.backoff_multiplier),
            ));
        }

        // A limit that is engaged keeps its counted failures plus one
        // refusal record inside the window.
        let history = &self.history;
        let needed = rotation.max_attempts_per_window as usize + 1;
        if history.max_records < needed {
            return Err(invalid(
                "history.max_records",
                format!(
                    "must be at least {needed} (rotation.max_attempts_per_window + 1), got {}",
                    history.max_records
                ),
            ));
        }
        if history.max_password_history > history.max_records {
            return Err(invalid(
                "history.max_password_history",
                format!(
                    "must not exceed history.max_records ({}), got {}",
                    history.max_records, history.max_password_history
                ),
            ));
        }
        if self.remote.base_url.trim().is_empty() {
            return Err(invalid("remote.base_url", "must not be empty"));
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the checks that need the credential:
    /// both secrets must decode to usable keys.
    pub fn preflight(&self, credential: &AccountCredential) -> Result<(), ConfigError> {
        self.validate()?;
        if credential.login.trim().is_empty() {
            return Err(invalid("login", "must not be empty"));
        }
        CodeGenerator::new(&credential.shared_secret, self.account.code_digits)?;
        ConfirmationSigner::new(&credential.identity_secret)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SecretString;
    use pretty_assertions::assert_eq;

    fn credential(shared_secret: &str) -> AccountCredential {
        AccountCredential::new(
            "alice",
            SecretString::new("Password-1"),
            SecretString::new(shared_secret),
            SecretString::new("MTIzNDU2Nzg5MDEyMzQ1Njc4OTA="),
            "device",
            1,
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RotatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rotation.change_interval, Duration::from_secs(86_400));
        assert_eq!(config.password.length, 16);
        assert_eq!(config.history.max_password_history, 10);
        assert_eq!(config.rotation.max_attempts_per_window, 3);
    }

    #[test]
    fn test_humantime_durations() {
        let config: RotatorConfig = serde_json::from_str(
            r#"{"rotation": {"change_interval": "12h", "rate_limit_window": "30m"}}"#,
        )
        .unwrap();
        assert_eq!(config.rotation.change_interval, Duration::from_secs(12 * 3600));
        assert_eq!(config.rotation.rate_limit_window, Duration::from_secs(1800));
        assert_eq!(config.rotation.busy_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = RotatorConfig::default();
        config.rotation.max_attempts_per_window = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "rotation.max_attempts_per_window",
                ..
            })
        ));
    }

    #[test]
    fn test_history_must_hold_an_engaged_rate_limit() {
        let mut config = RotatorConfig::default();
        config.history.max_records = 2;
        config.history.max_password_history = 2;
        config.rotation.max_attempts_per_window = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "history.max_records",
                ..
            })
        ));

        config.history.max_records = 4;
        config.validate().unwrap();
    }

    #[test]
    fn test_password_history_bounded_by_retention() {
        let mut config = RotatorConfig::default();
        config.history.max_records = 5;
        config.history.max_password_history = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "history.max_password_history",
                ..
            })
        ));
    }

    #[test]
    fn test_policy_error_surfaces() {
        let mut config = RotatorConfig::default();
        config.password.length = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Policy(_))));
    }

    #[test]
    fn test_preflight_rejects_bad_secret() {
        let config = RotatorConfig::default();
        config
            .preflight(&credential("MTIzNDU2Nzg5MDEyMzQ1Njc4OTA="))
            .unwrap();
        assert!(matches!(
            config.preflight(&credential("c2hvcnQ=")),
            Err(ConfigError::Code(CodeError::SecretLength { .. }))
        ));
    }
}
