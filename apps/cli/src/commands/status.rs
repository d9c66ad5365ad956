//! `rotator status`: read-only view of the schedule and history.
//!
//! Takes no lock and makes no network call, so it works while the scheduler
//! is mid-run.

use chrono::Utc;
use rotator_credential::history::{Outcome, RotationRecord};
use rotator_credential::rotation::{RotationPolicy, StatusReport};
use rotator_credential::store::{CredentialStore, FileCredentialStore};
use rotator_credential::{HistoryStore, RotatorConfig};
use std::fmt::Write as _;
use std::process::ExitCode;

use super::{span, timestamp};
use crate::cli::StatusArgs;

pub fn run(config: &RotatorConfig, args: &StatusArgs) -> anyhow::Result<ExitCode> {
    let history = HistoryStore::open_read_only(&config.history.path, config.history.max_records)?;

    // Status must not depend on the secrets being usable.
    let login = match FileCredentialStore::new(&config.account.credential_file).load() {
        Ok(credential) => credential.login,
        Err(e) => {
            tracing::warn!(error = %e, "Account credential unavailable");
            "-".to_string()
        }
    };

    let report = StatusReport::collect(
        &history,
        &RotationPolicy::from_config(config),
        login,
        Utc::now(),
        args.limit,
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(ExitCode::SUCCESS)
}

fn render(report: &StatusReport) -> String {
    let mut out = String::new();
    let schedule = &report.schedule;

    let _ = writeln!(out, "Account:         {}", report.login);
    let _ = writeln!(out, "Interval:        {}", span(schedule.interval));
    let _ = writeln!(
        out,
        "Last rotation:   {}",
        schedule.last_success_at.map_or_else(|| "never".to_string(), timestamp)
    );
    let next = if report.pending_unconfirmed.is_some() {
        "suspended".to_string()
    } else if report.due_now {
        "due now".to_string()
    } else {
        timestamp(schedule.next_due_at)
    };
    let _ = writeln!(out, "Next rotation:   {next}");
    let _ = writeln!(out, "Successes:       {}", report.total_successes);
    let _ = writeln!(
        out,
        "Recent failures: {} of {} allowed",
        report.recent_failures, report.max_attempts_per_window
    );
    if let Some(until) = report.rate_limited_until {
        let _ = writeln!(out, "Rate limited until {}", timestamp(until));
    }
    if let Some(pending) = &report.pending_unconfirmed {
        let _ = writeln!(
            out,
            "\nUnconfirmed password change at {}. Automatic rotation is suspended;\n\
             check the account, then run `rotator resolve --applied` or `--not-applied`.",
            timestamp(pending.timestamp)
        );
    }

    if !report.recent.is_empty() {
        let _ = writeln!(out, "\nRecent:");
        for record in &report.recent {
            let _ = writeln!(out, "  {}", line(record));
        }
    }
    out
}

fn line(record: &RotationRecord) -> String {
    let outcome = match record.outcome {
        Outcome::Success => "success",
        Outcome::Failure => "failure",
    };
    let mut line = format!(
        "{}  {:<10} {:<8}",
        timestamp(record.timestamp),
        record.trigger.to_string(),
        outcome
    );
    if let Some(reason) = record.reason {
        let _ = write!(line, " {reason}");
    }
    if let Some(detail) = &record.detail {
        let _ = write!(line, " ({detail})");
    }
    line.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotator_credential::history::{FailureReason, Trigger};
    use rotator_credential::rotation::RotationSchedule;
    use std::time::Duration;

    fn report(recent: Vec<RotationRecord>) -> StatusReport {
        let now = chrono::DateTime::from_timestamp(1_714_550_415, 0).unwrap();
        StatusReport {
            login: "alice".into(),
            schedule: RotationSchedule::compute(Duration::from_secs(86_400), None, now),
            due_now: true,
            last_record: recent.first().cloned(),
            total_successes: 0,
            recent_failures: recent.len(),
            max_attempts_per_window: 3,
            rate_limited_until: None,
            pending_unconfirmed: None,
            recent,
        }
    }

    #[test]
    fn test_render_never_rotated() {
        let text = render(&report(Vec::new()));
        assert!(text.contains("Account:         alice"));
        assert!(text.contains("Last rotation:   never"));
        assert!(text.contains("Next rotation:   due now"));
        assert!(!text.contains("Recent:"));
    }

    #[test]
    fn test_render_failure_line() {
        let at = chrono::DateTime::from_timestamp(1_714_550_415, 0).unwrap();
        let record = RotationRecord::failure(
            Trigger::Manual,
            at,
            FailureReason::TransientNetwork,
            "connection reset",
            Duration::from_millis(10),
        );

        let text = render(&report(vec![record]));

        assert!(text.contains(
            "2024-05-01 08:00:15 UTC  manual     failure  transient_network (connection reset)"
        ));
    }
}
