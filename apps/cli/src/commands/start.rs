//! `rotator start`: run the scheduler until SIGINT or SIGTERM.

use anyhow::Context;
use rotator_credential::RotatorConfig;
use rotator_credential::rotation::{Scheduler, ServiceError};
use std::process::ExitCode;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::app;

/// Time to write the record after the last remote call gave up.
const RECORD_SLACK: Duration = Duration::from_secs(5);

pub async fn run(config: &RotatorConfig) -> anyhow::Result<ExitCode> {
    let service = app::build_service(config)?;
    let (scheduler, _handle) = Scheduler::new(service);
    let shutdown = CancellationToken::new();
    let mut task = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::select! {
        () = shutdown_signal() => {
            tracing::info!(
                grace_secs = config.rotation.shutdown_grace.as_secs(),
                "Shutdown requested"
            );
            shutdown.cancel();
        }
        joined = &mut task => return finish(joined),
    }

    match tokio::time::timeout(config.rotation.shutdown_grace + RECORD_SLACK, &mut task).await {
        Ok(joined) => finish(joined),
        Err(_) => {
            tracing::error!("Scheduler did not stop within the shutdown grace, exiting anyway");
            task.abort();
            Ok(ExitCode::FAILURE)
        }
    }
}

fn finish(joined: Result<Result<(), ServiceError>, JoinError>) -> anyhow::Result<ExitCode> {
    joined
        .context("scheduler task panicked")?
        .context("scheduler stopped")?;
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
