//! Rotation Scheduler
//!
//! Long-running loop that wakes when a rotation is due and runs it through
//! [`RotationService`]. Manual runs requested through a [`SchedulerHandle`]
//! are executed by the same loop, so they serialize with scheduled ones.
//!
//! The wake time is recomputed from history on every iteration:
//!
//! - the next due time (`last success + change interval`)
//! - pushed back to `last failure + failure retry delay` after a failed run
//! - pushed back to when the rate limit clears
//!
//! While an unconfirmed change is pending the scheduler stays idle until it is
//! resolved. Sleeps are capped at [`MAX_SLEEP`] so changes made by other
//! processes are noticed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::error::ServiceError;
use super::orchestrator::RunOutcome;
use super::service::RotationService;
use crate::core::{add_std, until};
use crate::history::Trigger;

/// Longest single sleep before history is re-read.
pub const MAX_SLEEP: Duration = Duration::from_secs(5 * 60);

type RunReply = oneshot::Sender<Result<RunOutcome, ServiceError>>;

/// A manual run request. The loop signals `started` before running and
/// drops requests whose sender has stopped waiting.
#[derive(Debug)]
struct RunRequest {
    started: oneshot::Sender<()>,
    reply: RunReply,
}

/// Requests a manual run from a running [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<RunRequest>,
    busy_grace: Duration,
}

impl SchedulerHandle {
    /// Run a rotation now and wait for its outcome.
    ///
    /// Fails with [`ServiceError::Busy`] if the loop does not pick the
    /// request up within the service's busy grace, e.g. because another run
    /// is still in progress. An expired request is never run.
    pub async fn rotate_now(&self) -> Result<RunOutcome, ServiceError> {
        let (started_tx, started) = oneshot::channel();
        let (reply, outcome) = oneshot::channel();
        let request = RunRequest {
            started: started_tx,
            reply,
        };

        let accepted = timeout(self.busy_grace, async {
            self.tx
                .send(request)
                .await
                .map_err(|_| ServiceError::SchedulerStopped)?;
            started.await.map_err(|_| ServiceError::SchedulerStopped)
        })
        .await;
        match accepted {
            Err(_) => {
                return Err(ServiceError::Busy {
                    waited: self.busy_grace,
                });
            }
            Ok(result) => result?,
        }

        outcome.await.map_err(|_| ServiceError::SchedulerStopped)?
    }
}

/// Background rotation loop
#[derive(Debug)]
pub struct Scheduler {
    service: Arc<RotationService>,
    requests: mpsc::Receiver<RunRequest>,
    error_backoff: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<RotationService>) -> (Self, SchedulerHandle) {
        let (tx, requests) = mpsc::channel(8);
        let handle = SchedulerHandle {
            tx,
            busy_grace: service.busy_grace(),
        };
        (
            Self {
                service,
                requests,
                error_backoff: Duration::from_secs(60),
            },
            handle,
        )
    }

    /// Pause after a run could not start (busy gate, unreadable credential).
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Run until `shutdown` fires.
    ///
    /// An in-flight run is handed the same token, so shutdown interrupts it
    /// at the next safe point. Only a history failure ends the loop early.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        tracing::info!(
            history = %self.service.history().path().display(),
            "Rotation scheduler started"
        );
        let mut hold_until: Option<DateTime<Utc>> = None;

        loop {
            let clock = self.service.orchestrator().clock().clone();
            let now = clock.now();
            let wake = self
                .service
                .next_wake(now)?
                .map(|at| hold_until.map_or(at, |hold| at.max(hold)));

            let nap = wake.map_or(MAX_SLEEP, |at| until(now, at).min(MAX_SLEEP));
            match wake {
                Some(at) => tracing::debug!(wake_at = %at, sleep_ms = nap.as_millis() as u64, "Scheduler sleeping"),
                None => tracing::warn!("Scheduled rotation suspended: unconfirmed change awaiting resolution"),
            }

            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::info!("Rotation scheduler shutting down");
                    return Ok(());
                }

                Some(request) = self.requests.recv() => {
                    if request.started.send(()).is_err() {
                        tracing::debug!("Manual run request expired before it started");
                        continue;
                    }
                    let result = self.service.rotate(Trigger::Manual, &shutdown).await;
                    // The requester may have gone away since.
                    let _ = request.reply.send(result);
                }

                () = sleep(nap) => {
                    let due = wake.is_some_and(|at| clock.now() >= at);
                    if !due {
                        continue;
                    }
                    match self.service.rotate(Trigger::Scheduled, &shutdown).await {
                        Ok(RunOutcome::NotDue(schedule)) => {
                            tracing::debug!(next_due_at = %schedule.next_due_at, "Woke early");
                        }
                        Ok(RunOutcome::Throttled { error, .. }) => {
                            tracing::debug!(error = %error, "Woke while rate limited");
                        }
                        Ok(RunOutcome::Completed(report)) => {
                            hold_until = None;
                            tracing::info!(
                                success = report.is_success(),
                                next_due_at = %report.schedule.next_due_at,
                                "Scheduled rotation finished"
                            );
                        }
                        Err(ServiceError::History(e)) => return Err(ServiceError::History(e)),
                        Err(ServiceError::UnresolvedChange { at }) => {
                            tracing::warn!(pending_since = %at, "Scheduled rotation blocked");
                        }
                        Err(e) => {
                            let hold = add_std(clock.now(), self.error_backoff);
                            tracing::warn!(error = %e, retry_at = %hold, "Scheduled rotation could not start");
                            hold_until = Some(hold);
                        }
                    }
                }
            }
        }
    }
}
