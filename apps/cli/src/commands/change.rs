//! `rotator change`: one manual rotation, outside the schedule.

use rotator_credential::RotatorConfig;
use rotator_credential::history::{RotationRecord, Trigger};
use rotator_credential::rotation::{RotationSchedule, RunOutcome, RunReport, ServiceError};
use serde::Serialize;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use super::{exit, timestamp};
use crate::app;
use crate::cli::ChangeArgs;

#[derive(Serialize)]
struct ChangeOutput<'a> {
    record: &'a RotationRecord,
    error: Option<String>,
    schedule: &'a RotationSchedule,
}

pub async fn run(config: &RotatorConfig, args: &ChangeArgs) -> anyhow::Result<ExitCode> {
    let service = app::build_service(config)?;

    // Ctrl+C stops the run at its next safe point.
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current step");
                cancel.cancel();
            }
        }
    });
    let result = service.rotate(Trigger::Manual, &cancel).await;
    watcher.abort();

    match result {
        Ok(RunOutcome::Completed(report)) => {
            print_report(&report, args.json)?;
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(exit::FAILED)
            })
        }
        Ok(RunOutcome::NotDue(schedule)) => {
            println!("Not due until {}", timestamp(schedule.next_due_at));
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Throttled { error, .. }) => {
            eprintln!("{error}");
            Ok(ExitCode::from(exit::REFUSED))
        }
        Err(e @ (ServiceError::Busy { .. } | ServiceError::UnresolvedChange { .. })) => {
            eprintln!("{e}");
            Ok(ExitCode::from(exit::REFUSED))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        let output = ChangeOutput {
            record: &report.record,
            error: report.error.as_ref().map(ToString::to_string),
            schedule: &report.schedule,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &report.error {
        None => {
            println!("Password rotated at {}", timestamp(report.record.timestamp));
            if let Some(detail) = &report.record.detail {
                println!("Warning: {detail}");
            }
            println!("Next rotation due {}", timestamp(report.schedule.next_due_at));
        }
        Some(error) => {
            let reason = report
                .record
                .reason
                .map_or_else(|| "failure".to_string(), |r| r.to_string());
            println!("Rotation failed ({reason}): {error}");
        }
    }
    Ok(())
}
