//! Subcommand implementations

pub mod change;
pub mod resolve;
pub mod start;
pub mod status;
pub mod test_connection;
pub mod test_password;

use chrono::{DateTime, Utc};
use std::process::ExitCode;
use std::time::Duration;

use crate::cli::Command;
use crate::config::CliConfig;

/// Process exit codes
pub mod exit {
    /// Configuration could not be loaded or failed validation
    pub const CONFIG: u8 = 2;
    /// A run or login was attempted and failed
    pub const FAILED: u8 = 3;
    /// The request was refused: busy, unresolved change, nothing to resolve
    pub const REFUSED: u8 = 4;
}

pub async fn dispatch(command: Command, config: CliConfig) -> anyhow::Result<ExitCode> {
    let config = config.rotator;
    match command {
        Command::Start => start::run(&config).await,
        Command::Status(args) => status::run(&config, &args),
        Command::Change(args) => change::run(&config, &args).await,
        Command::TestPassword(args) => test_password::run(&config, &args),
        Command::TestConnection => test_connection::run(&config).await,
        Command::Resolve(args) => resolve::run(&config, &args).await,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `1d 6h`, `45m`, `30s`; two most significant units.
fn span(duration: Duration) -> String {
    let secs = duration.as_secs();
    let units = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];
    let parts: Vec<String> = units
        .iter()
        .scan(secs, |left, (size, unit)| {
            let n = *left / size;
            *left %= size;
            Some((n, *unit))
        })
        .filter(|(n, _)| *n > 0)
        .take(2)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span() {
        assert_eq!(span(Duration::from_secs(86_400)), "1d");
        assert_eq!(span(Duration::from_secs(86_400 + 6 * 3600 + 59)), "1d 6h");
        assert_eq!(span(Duration::from_secs(45 * 60)), "45m");
        assert_eq!(span(Duration::from_millis(300)), "0s");
    }

    #[test]
    fn test_timestamp() {
        let at = DateTime::from_timestamp(1_714_550_415, 0).unwrap();
        assert_eq!(timestamp(at), "2024-05-01 08:00:15 UTC");
    }
}
