//! Gated entry points for rotation runs
//!
//! [`RotationService`] wraps the orchestrator with everything a run needs
//! around it: the cross-process gate, a fresh view of history and the
//! credential, the unconfirmed-change block, and operator resolution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::{RotationError, ServiceError};
use super::gate::{RunGate, lock_path};
use super::orchestrator::{RotationOrchestrator, RotationPolicy, RunOutcome};
use super::schedule::RotationSchedule;
use crate::core::{AccountCredential, SecretString, add_std};
use crate::history::{HistoryStore, RecordKind, RotationRecord, SaltedHash, Trigger};
use crate::remote::Session;

/// Snapshot of the rotation state for display
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub login: String,
    pub schedule: RotationSchedule,
    pub due_now: bool,
    pub last_record: Option<RotationRecord>,
    pub total_successes: usize,
    pub recent_failures: usize,
    pub max_attempts_per_window: u32,
    pub rate_limited_until: Option<DateTime<Utc>>,
    /// Unconfirmed change blocking all runs until resolved
    pub pending_unconfirmed: Option<RotationRecord>,
    /// Newest first
    pub recent: Vec<RotationRecord>,
}

impl StatusReport {
    /// Build a report from history alone; no lock, no network.
    pub fn collect(
        history: &HistoryStore,
        policy: &RotationPolicy,
        login: impl Into<String>,
        now: DateTime<Utc>,
        recent: usize,
    ) -> Self {
        let schedule = RotationSchedule::from_history(history, policy.change_interval, now);
        Self {
            login: login.into(),
            due_now: schedule.is_due(now),
            schedule,
            last_record: history.last_record(),
            total_successes: history.total_successes(),
            recent_failures: history.recent_failures(policy.rate_limit_window, now),
            max_attempts_per_window: policy.max_attempts_per_window,
            rate_limited_until: history.rate_limit_clears_at(
                policy.rate_limit_window,
                policy.max_attempts_per_window,
                now,
            ),
            pending_unconfirmed: history.pending_unconfirmed(),
            recent: history.list(recent),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited_until.is_some()
    }
}

/// Rotation runs behind the run gate.
#[derive(Debug)]
pub struct RotationService {
    orchestrator: RotationOrchestrator,
    credential: Mutex<AccountCredential>,
    lock_path: PathBuf,
    busy_grace: Duration,
    failure_retry_delay: Duration,
}

impl RotationService {
    pub fn new(orchestrator: RotationOrchestrator, credential: AccountCredential) -> Self {
        let lock_path = lock_path(orchestrator.history().path());
        Self {
            orchestrator,
            credential: Mutex::new(credential),
            lock_path,
            busy_grace: Duration::from_secs(5),
            failure_retry_delay: Duration::from_secs(15 * 60),
        }
    }

    /// How long a run waits for one already in progress.
    pub fn with_busy_grace(mut self, grace: Duration) -> Self {
        self.busy_grace = grace;
        self
    }

    /// Minimum pause between a failed run and the next scheduled one.
    pub fn with_failure_retry_delay(mut self, delay: Duration) -> Self {
        self.failure_retry_delay = delay;
        self
    }

    pub fn orchestrator(&self) -> &RotationOrchestrator {
        &self.orchestrator
    }

    pub fn history(&self) -> &HistoryStore {
        self.orchestrator.history()
    }

    pub fn busy_grace(&self) -> Duration {
        self.busy_grace
    }

    pub fn lock_path(&self) -> &std::path::Path {
        &self.lock_path
    }

    /// Run a rotation under the gate.
    ///
    /// Refused with [`ServiceError::UnresolvedChange`] while an unconfirmed
    /// change is pending, and with [`ServiceError::Busy`] when another run
    /// keeps the gate for longer than the busy grace.
    pub async fn rotate(
        &self,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ServiceError> {
        let _gate = RunGate::acquire(&self.lock_path, self.busy_grace).await?;

        let history = self.history();
        history.reload()?;
        if let Some(pending) = history.pending_unconfirmed() {
            tracing::warn!(
                record_id = %pending.id,
                at = %pending.timestamp,
                "Run refused: unconfirmed change awaiting resolution"
            );
            return Err(ServiceError::UnresolvedChange {
                at: pending.timestamp,
            });
        }

        let mut credential = self.credential.lock().await;
        self.refresh_credential(&mut credential)?;

        Ok(self
            .orchestrator
            .run(&mut credential, trigger, cancel)
            .await?)
    }

    /// Record the operator's verdict on a pending unconfirmed change.
    ///
    /// `live_password` is the password now in effect remotely if the change
    /// did apply; `None` means it did not and the stored password stands.
    pub async fn resolve(
        &self,
        live_password: Option<SecretString>,
    ) -> Result<RotationRecord, ServiceError> {
        let _gate = RunGate::acquire(&self.lock_path, self.busy_grace).await?;

        let history = self.history();
        history.reload()?;
        let pending = history
            .pending_unconfirmed()
            .ok_or(ServiceError::NothingToResolve)?;

        let now = self.orchestrator.clock().now();
        let record = match live_password {
            Some(password) => {
                let matches_attempt = pending
                    .password_hash
                    .as_ref()
                    .is_some_and(|hash| hash.matches(&password));
                if !matches_attempt {
                    tracing::warn!(
                        record_id = %pending.id,
                        "Supplied password differs from the unconfirmed attempt"
                    );
                }
                let hash = SaltedHash::new(&password);
                let mut credential = self.credential.lock().await;
                self.refresh_credential(&mut credential)?;
                credential.commit_password(password);
                self.orchestrator.credentials().save(&credential)?;
                RotationRecord::resolution(now, Some(hash))
            }
            None => RotationRecord::resolution(now, None),
        };

        history.append(record.clone())?;
        tracing::info!(
            record_id = %record.id,
            resolves = %pending.id,
            applied = record.is_success(),
            "Unconfirmed change resolved"
        );
        Ok(record)
    }

    /// Current status, reloading history first.
    pub async fn status(&self) -> Result<StatusReport, ServiceError> {
        self.history().reload()?;
        let login = self.credential.lock().await.login.clone();
        Ok(StatusReport::collect(
            self.history(),
            self.orchestrator.policy(),
            login,
            self.orchestrator.clock().now(),
            10,
        ))
    }

    /// Log in with the stored credential without rotating.
    pub async fn test_connection(&self) -> Result<Session, RotationError> {
        let credential = self.credential.lock().await;
        self.orchestrator.test_connection(&credential).await
    }

    /// When the scheduler should next attempt a run.
    ///
    /// `None` while an unconfirmed change is pending: automatic runs are
    /// suspended until an operator resolves it.
    pub fn next_wake(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ServiceError> {
        let history = self.history();
        history.reload()?;
        if history.pending_unconfirmed().is_some() {
            return Ok(None);
        }

        let policy = self.orchestrator.policy();
        let mut wake = RotationSchedule::from_history(history, policy.change_interval, now)
            .next_due_at;

        if let Some(last) = history.last_record() {
            if last.kind == RecordKind::Rotation && !last.is_success() {
                wake = wake.max(add_std(last.timestamp, self.failure_retry_delay));
            }
        }
        if let Some(clears_at) = history.rate_limit_clears_at(
            policy.rate_limit_window,
            policy.max_attempts_per_window,
            now,
        ) {
            wake = wake.max(clears_at);
        }
        Ok(Some(wake))
    }

    /// Pick up a credential rewritten by another process.
    ///
    /// If the file lags behind the last successful rotation (an earlier save
    /// failed) the in-memory password is kept and written back instead.
    fn refresh_credential(&self, credential: &mut AccountCredential) -> Result<(), ServiceError> {
        let store = self.orchestrator.credentials();
        let stored = store.load()?;
        if stored.password().matches(credential.password()) {
            *credential = stored;
            return Ok(());
        }

        let live = self.history().last_success().and_then(|r| r.password_hash);
        let memory_is_live = live.as_ref().is_some_and(|h| h.matches(credential.password()));
        let stored_is_live = live.as_ref().is_some_and(|h| h.matches(stored.password()));

        if memory_is_live && !stored_is_live {
            tracing::warn!(login = %credential.login, "Credential file is stale; rewriting it");
            if let Err(e) = store.save(credential) {
                tracing::error!(error = %e, "Failed to rewrite stale credential file");
            }
        } else {
            tracing::info!(login = %stored.login, "Credential changed on disk; reloaded");
            *credential = stored;
        }
        Ok(())
    }
}
