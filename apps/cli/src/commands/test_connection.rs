//! `rotator test-connection`: authenticate only, never change the password.

use rotator_credential::RotatorConfig;
use std::process::ExitCode;

use super::exit;
use crate::app;

pub async fn run(config: &RotatorConfig) -> anyhow::Result<ExitCode> {
    let service = app::build_service(config)?;

    match service.test_connection().await {
        Ok(session) => {
            match session.account_id {
                Some(id) => println!("Login succeeded (account {id})"),
                None => println!("Login succeeded"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Login failed: {e}");
            Ok(ExitCode::from(exit::FAILED))
        }
    }
}
