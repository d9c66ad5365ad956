//! `rotator resolve`: record what happened to an unconfirmed change.

use anyhow::Context;
use rotator_credential::rotation::ServiceError;
use rotator_credential::{RotatorConfig, SecretString};
use std::io::BufRead;
use std::process::ExitCode;

use super::{exit, timestamp};
use crate::app;
use crate::cli::ResolveArgs;

/// Carries the live password for `--applied` without putting it on the
/// command line.
pub const PASSWORD_VAR: &str = "ROTATOR_RESOLVED_PASSWORD";

pub async fn run(config: &RotatorConfig, args: &ResolveArgs) -> anyhow::Result<ExitCode> {
    let live_password = if args.applied {
        Some(read_password()?)
    } else {
        None
    };

    let service = app::build_service(config)?;
    match service.resolve(live_password).await {
        Ok(record) => {
            if record.is_success() {
                println!(
                    "Recorded at {}: change applied, stored password updated",
                    timestamp(record.timestamp)
                );
            } else {
                println!(
                    "Recorded at {}: change not applied, stored password kept",
                    timestamp(record.timestamp)
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ (ServiceError::NothingToResolve | ServiceError::Busy { .. })) => {
            eprintln!("{e}");
            Ok(ExitCode::from(exit::REFUSED))
        }
        Err(e) => Err(e.into()),
    }
}

fn read_password() -> anyhow::Result<SecretString> {
    let password = match std::env::var(PASSWORD_VAR) {
        Ok(value) => value,
        Err(_) => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read the password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    anyhow::ensure!(
        !password.is_empty(),
        "--applied needs the live password in {PASSWORD_VAR} or on stdin"
    );
    Ok(SecretString::new(password))
}
