//! The rotation state machine
//!
//! One call to [`RotationOrchestrator::run`] is one run:
//!
//! ```text
//! Idle → CheckingDue → Authenticating → GeneratingPassword → Submitting → ConfirmingIfRequired → Recording → Idle
//! ```
//!
//! Any failure jumps to `Recording`, which always writes exactly one history
//! record. The exception is a rate-limit refusal inside a window that
//! already holds one: it returns to `Idle` unrecorded. The stored password changes only when the remote side has
//! accepted (and, if asked, confirmed) the new one.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::RotationError;
use super::retry::{CallFailure, CallGuard, Interrupted, RetryPolicy, with_retry};
use super::schedule::RotationSchedule;
use super::state::RotationState;
use crate::codegen::{CodeGenerator, ConfirmationSigner, DEFAULT_DIGITS, OneTimeCode};
use crate::config::RotatorConfig;
use crate::core::{AccountCredential, Clock, SecretString, SystemClock};
use crate::history::{HistoryError, HistoryStore, RotationRecord, SaltedHash, Trigger};
use crate::notify::{NoopNotifier, Notifier, RotationEvent};
use crate::password::{PasswordCandidate, PasswordGenerator};
use crate::remote::{
    AuthRejection, ChangeResult, ConfirmResult, ConfirmationPayload, PendingConfirmation,
    RemoteAccountClient, RemoteError, Session,
};
use crate::store::CredentialStore;

/// Candidates tried before giving up on reuse collisions.
pub const MAX_CANDIDATES: u32 = 5;

/// Per-run rules, derived from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RotationPolicy {
    pub change_interval: Duration,
    pub max_attempts_per_window: u32,
    pub rate_limit_window: Duration,
    pub max_password_history: usize,
    pub code_digits: u32,
    pub retry: RetryPolicy,
    pub shutdown_grace: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::from_config(&RotatorConfig::default())
    }
}

impl RotationPolicy {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            change_interval: config.rotation.change_interval,
            max_attempts_per_window: config.rotation.max_attempts_per_window,
            rate_limit_window: config.rotation.rate_limit_window,
            max_password_history: config.history.max_password_history,
            code_digits: if config.account.code_digits == 0 {
                DEFAULT_DIGITS
            } else {
                config.account.code_digits
            },
            retry: config.rotation.retry.clone(),
            shutdown_grace: config.rotation.shutdown_grace,
        }
    }
}

/// A run that reached `Recording`
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The record written for this run
    pub record: RotationRecord,
    /// Why the run failed, if it did
    pub error: Option<RotationError>,
    /// Schedule after the record was written
    pub schedule: RotationSchedule,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.record.is_success()
    }
}

/// Result of [`RotationOrchestrator::run`]
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Scheduled run before the due time; nothing recorded
    NotDue(RotationSchedule),
    /// The run was recorded
    Completed(RunReport),
    /// Refused by the rate limit while an earlier refusal inside the same
    /// window is already on record; nothing recorded
    Throttled {
        error: RotationError,
        schedule: RotationSchedule,
    },
}

/// State shared between the run phases.
#[derive(Debug)]
struct Attempt {
    state: RotationState,
    /// Hash of the submitted candidate, once submission started
    attempted: Option<SaltedHash>,
}

impl Attempt {
    fn new() -> Self {
        Self {
            state: RotationState::Idle,
            attempted: None,
        }
    }

    fn advance(&mut self, to: RotationState) -> Result<(), RotationError> {
        self.state = self.state.transition_to(to)?;
        tracing::debug!(state = %to, "Rotation state");
        Ok(())
    }

    /// Honour cancellation between states before the change is submitted.
    fn checkpoint(&self, guard: &CallGuard) -> Result<(), RotationError> {
        if guard.is_cancelled() {
            Err(RotationError::Cancelled { state: self.state })
        } else {
            Ok(())
        }
    }
}

enum Step {
    NotDue(RotationSchedule),
    Throttled(RotationError),
    Applied(PasswordCandidate),
}

/// Coordinates one rotation run against the remote service.
pub struct RotationOrchestrator {
    remote: Arc<dyn RemoteAccountClient>,
    history: Arc<HistoryStore>,
    passwords: Arc<dyn PasswordGenerator>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: RotationPolicy,
}

impl std::fmt::Debug for RotationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationOrchestrator")
            .field("history", &self.history.path())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RotationOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteAccountClient>,
        history: Arc<HistoryStore>,
        passwords: Arc<dyn PasswordGenerator>,
        credentials: Arc<dyn CredentialStore>,
        policy: RotationPolicy,
    ) -> Self {
        Self {
            remote,
            history,
            passwords,
            credentials,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Schedule as of now.
    pub fn schedule(&self) -> RotationSchedule {
        RotationSchedule::from_history(
            &self.history,
            self.policy.change_interval,
            self.clock.now(),
        )
    }

    /// Execute one run.
    ///
    /// The caller must hold the run gate. Only a history write failure is
    /// returned as an error; every rotation failure is recorded and reported
    /// in the [`RunReport`].
    pub async fn run(
        &self,
        credential: &mut AccountCredential,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, HistoryError> {
        let started = Instant::now();
        let guard = CallGuard::new(cancel.clone(), self.policy.shutdown_grace);
        let mut attempt = Attempt::new();

        let result = self
            .execute(credential, trigger, &guard, &mut attempt)
            .await;

        let outcome = match result {
            Ok(Step::NotDue(schedule)) => {
                tracing::debug!(
                    next_due_at = %schedule.next_due_at,
                    "Rotation not due"
                );
                return Ok(RunOutcome::NotDue(schedule));
            }
            Ok(Step::Throttled(error)) => {
                tracing::info!(error = %error, "Rotation refused; refusal already recorded");
                return Ok(RunOutcome::Throttled {
                    error,
                    schedule: self.schedule(),
                });
            }
            Ok(Step::Applied(candidate)) => Ok(candidate.into_secret()),
            Err(error) => Err(error),
        };

        if let Err(e) = attempt.advance(RotationState::Recording) {
            tracing::error!(error = %e, "Rotation state machine violated");
        }

        let report = self
            .record(credential, trigger, outcome, attempt.attempted, started.elapsed())
            .await?;
        Ok(RunOutcome::Completed(report))
    }

    async fn execute(
        &self,
        credential: &AccountCredential,
        trigger: Trigger,
        guard: &CallGuard,
        attempt: &mut Attempt,
    ) -> Result<Step, RotationError> {
        attempt.advance(RotationState::CheckingDue)?;
        let now = self.clock.now();

        if trigger == Trigger::Scheduled {
            let schedule = RotationSchedule::from_history(
                &self.history,
                self.policy.change_interval,
                now,
            );
            if !schedule.is_due(now) {
                attempt.advance(RotationState::Idle)?;
                return Ok(Step::NotDue(schedule));
            }
        }

        let window = self.policy.rate_limit_window;
        let failures = self.history.recent_failures(window, now);
        if failures >= self.policy.max_attempts_per_window as usize {
            let error = RotationError::RateLimited {
                failures,
                window,
                clears_at: self.history.rate_limit_clears_at(
                    window,
                    self.policy.max_attempts_per_window,
                    now,
                ),
            };
            // One refusal record per window, so refusals cannot evict the
            // failures that engaged the limit.
            if self.history.recent_refusal(window, now).is_some() {
                attempt.advance(RotationState::Idle)?;
                return Ok(Step::Throttled(error));
            }
            return Err(error);
        }

        tracing::info!(
            trigger = %trigger,
            login = %credential.login,
            recent_failures = failures,
            "Starting password rotation"
        );

        attempt.checkpoint(guard)?;
        attempt.advance(RotationState::Authenticating)?;
        let session = self.login(credential, guard).await?;

        attempt.checkpoint(guard)?;
        attempt.advance(RotationState::GeneratingPassword)?;
        let candidate = self.generate_candidate(credential)?;

        attempt.checkpoint(guard)?;
        attempt.advance(RotationState::Submitting)?;
        attempt.attempted = Some(SaltedHash::new(candidate.secret()));
        let change = self.submit(&session, &candidate, guard).await?;

        attempt.advance(RotationState::ConfirmingIfRequired)?;
        if let ChangeResult::ConfirmationRequired(pending) = change {
            self.confirm(credential, &session, &pending, guard).await?;
        }

        Ok(Step::Applied(candidate))
    }

    /// Log in, retrying once with the adjacent-step code if the remote
    /// rejects the code itself.
    async fn login(
        &self,
        credential: &AccountCredential,
        guard: &CallGuard,
    ) -> Result<Session, RotationError> {
        let generator = CodeGenerator::new(&credential.shared_secret, self.policy.code_digits)
            .map_err(|e| RotationError::Configuration {
                reason: e.to_string(),
            })?;
        let now = self.clock.now();
        let code = generator.current_code(now);

        match self.login_with_code(credential, &code, guard).await {
            Err(CallFailure::Remote {
                error: RemoteError::AuthRejected(AuthRejection::InvalidCode),
                ..
            }) => {
                let adjacent = generator.adjacent_code(now);
                tracing::warn!(
                    step = code.step(),
                    adjacent_step = adjacent.step(),
                    "One-time code rejected; retrying with adjacent step"
                );
                self.login_with_code(credential, &adjacent, guard)
                    .await
                    .map_err(login_failure)
            }
            other => other.map_err(login_failure),
        }
    }

    async fn login_with_code(
        &self,
        credential: &AccountCredential,
        code: &OneTimeCode,
        guard: &CallGuard,
    ) -> Result<Session, CallFailure> {
        with_retry(&self.policy.retry, "login", guard, || {
            self.remote
                .login(&credential.login, credential.password(), code)
        })
        .await
    }

    fn generate_candidate(
        &self,
        credential: &AccountCredential,
    ) -> Result<PasswordCandidate, RotationError> {
        let recent = self
            .history
            .recent_password_hashes(self.policy.max_password_history);

        for attempt in 1..=MAX_CANDIDATES {
            let candidate = self.passwords.generate();
            let reused = candidate.secret().matches(credential.password())
                || recent.iter().any(|hash| hash.matches(candidate.secret()));
            if !reused {
                tracing::debug!(
                    attempt,
                    length = candidate.len(),
                    strength = %candidate.strength().strength,
                    "Generated password candidate"
                );
                return Ok(candidate);
            }
            tracing::debug!(attempt, "Candidate matches a recent password; regenerating");
        }
        Err(RotationError::PasswordReuse {
            attempts: MAX_CANDIDATES,
        })
    }

    /// Submit the candidate exactly once. A transient failure leaves the
    /// remote state unknown, so it is never resubmitted.
    async fn submit(
        &self,
        session: &Session,
        candidate: &PasswordCandidate,
        guard: &CallGuard,
    ) -> Result<ChangeResult, RotationError> {
        let result = guard
            .run(self.remote.change_password(session, candidate.secret()))
            .await;

        match result {
            Ok(Ok(change)) => Ok(change),
            Ok(Err(RemoteError::Rejected(reason))) => Err(RotationError::RemoteRejected { reason }),
            Ok(Err(RemoteError::AuthRejected(rejection))) => Err(RotationError::RemoteRejected {
                reason: rejection.to_string(),
            }),
            Ok(Err(RemoteError::Transient(message))) => Err(RotationError::UnconfirmedChange {
                state: RotationState::Submitting,
                reason: format!("change request outcome unknown: {message}"),
            }),
            Err(Interrupted) => Err(RotationError::UnconfirmedChange {
                state: RotationState::Submitting,
                reason: "shutdown interrupted the change request".to_string(),
            }),
        }
    }

    /// Sign and confirm the pending change, retrying with the same signature.
    /// The change itself is never re-issued.
    async fn confirm(
        &self,
        credential: &AccountCredential,
        session: &Session,
        pending: &PendingConfirmation,
        guard: &CallGuard,
    ) -> Result<(), RotationError> {
        let unconfirmed = |reason: String| RotationError::UnconfirmedChange {
            state: RotationState::ConfirmingIfRequired,
            reason,
        };

        let signer =
            ConfirmationSigner::new(&credential.identity_secret).map_err(|e| unconfirmed(e.to_string()))?;
        let payload = ConfirmationPayload::new(
            pending,
            &credential.device_id,
            session.account_id.unwrap_or(credential.account_id),
        );
        let signature = signer.sign(&pending.tag, &payload.canonical_bytes());

        let result = with_retry(&self.policy.retry, "confirm", guard, || {
            self.remote.confirm(session, &signature, &payload)
        })
        .await;

        match result {
            Ok(ConfirmResult::Confirmed) => Ok(()),
            Ok(ConfirmResult::AlreadyConfirmed) => {
                tracing::debug!(
                    confirmation_id = %pending.confirmation_id,
                    "Confirmation already accepted"
                );
                Ok(())
            }
            Err(CallFailure::Remote { error, attempts }) => Err(unconfirmed(format!(
                "confirmation failed after {attempts} attempts: {error}"
            ))),
            Err(CallFailure::Interrupted { .. }) => Err(unconfirmed(
                "shutdown interrupted the confirmation".to_string(),
            )),
        }
    }

    async fn record(
        &self,
        credential: &mut AccountCredential,
        trigger: Trigger,
        outcome: Result<SecretString, RotationError>,
        attempted: Option<SaltedHash>,
        elapsed: Duration,
    ) -> Result<RunReport, HistoryError> {
        let now = self.clock.now();

        let (record, error) = match outcome {
            Ok(password) => {
                let hash = attempted.unwrap_or_else(|| SaltedHash::new(&password));
                credential.commit_password(password);
                let record = RotationRecord::success(trigger, now, hash, elapsed);
                let record = match self.credentials.save(credential) {
                    Ok(()) => record,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "Password rotated but the credential file was not updated"
                        );
                        record.with_detail(format!("credential file not updated: {e}"))
                    }
                };
                (record, None)
            }
            Err(error) => {
                let record = RotationRecord::failure(
                    trigger,
                    now,
                    error.reason(),
                    error.to_string(),
                    elapsed,
                );
                let record = match attempted {
                    Some(hash) => record.with_password_hash(hash),
                    None => record,
                };
                (record, Some(error))
            }
        };

        self.history.append(record.clone())?;

        match &error {
            None => tracing::info!(
                record_id = %record.id,
                trigger = %trigger,
                duration_ms = record.duration_ms,
                "Password rotation succeeded"
            ),
            Some(e) => tracing::warn!(
                record_id = %record.id,
                trigger = %trigger,
                reason = %e.reason(),
                error = %e,
                duration_ms = record.duration_ms,
                "Password rotation failed"
            ),
        }

        self.notifier
            .notify(&RotationEvent::from_record(&record))
            .await;

        Ok(RunReport {
            schedule: RotationSchedule::from_history(
                &self.history,
                self.policy.change_interval,
                now,
            ),
            record,
            error,
        })
    }

    /// Log in without rotating, for connectivity checks.
    pub async fn test_connection(
        &self,
        credential: &AccountCredential,
    ) -> Result<Session, RotationError> {
        let guard = CallGuard::new(CancellationToken::new(), self.policy.shutdown_grace);
        self.login(credential, &guard).await
    }
}

fn login_failure(failure: CallFailure) -> RotationError {
    match failure {
        CallFailure::Remote {
            error: RemoteError::AuthRejected(rejection),
            ..
        } => RotationError::AuthRejected(rejection),
        CallFailure::Remote {
            error: RemoteError::Rejected(reason),
            ..
        } => RotationError::LoginRejected { reason },
        CallFailure::Remote {
            error: RemoteError::Transient(last_error),
            attempts,
        } => RotationError::TransientExhausted {
            operation: "login",
            attempts,
            last_error,
        },
        CallFailure::Interrupted { .. } => RotationError::Cancelled {
            state: RotationState::Authenticating,
        },
    }
}
