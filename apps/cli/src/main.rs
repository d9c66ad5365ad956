//! `rotator`: command-line front end for the password rotator.

mod app;
mod cli;
mod commands;
mod config;

use clap::Parser;
use rotator_log::Level;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::commands::exit;
use crate::config::CliConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(exit::CONFIG);
        }
    };

    let mut logging = config.logging.clone().overlay_env();
    if cli.verbose > 0 {
        logging = logging.with_level(Level::Info.more_verbose(cli.verbose));
    }
    let _guard = match rotator_log::init_with(logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(exit::CONFIG);
        }
    };

    match commands::dispatch(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            if e.downcast_ref::<rotator_credential::ConfigError>().is_some() {
                ExitCode::from(exit::CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
