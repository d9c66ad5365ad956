//! Rotation-specific error types
//!
//! [`RotationError`] classifies how a single run failed and maps onto the
//! [`FailureReason`] written to history. [`ServiceError`] covers the reasons a
//! run could not start or its result could not be kept.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::state::RotationState;
use crate::history::{FailureReason, HistoryError};
use crate::remote::AuthRejection;
use crate::store::CredentialStoreError;

/// Errors that end a single rotation run
#[derive(Debug, Clone, Error)]
pub enum RotationError {
    /// Too many recent failures; no remote call was made
    #[error("rate limited: {failures} failures in the last {window:?}")]
    RateLimited {
        failures: usize,
        window: Duration,
        clears_at: Option<DateTime<Utc>>,
    },

    /// The remote refused the login
    #[error("authentication rejected: {0}")]
    AuthRejected(AuthRejection),

    /// The remote refused the login request for another reason
    #[error("login rejected: {reason}")]
    LoginRejected { reason: String },

    /// Transient failures outlasted the retry budget before any change
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    TransientExhausted {
        operation: &'static str,
        attempts: u32,
        last_error: String,
    },

    /// The remote refused the new password
    #[error("password change rejected: {reason}")]
    RemoteRejected { reason: String },

    /// Every candidate matched the current or a recent password
    #[error("no acceptable password after {attempts} candidates")]
    PasswordReuse { attempts: u32 },

    /// The change may be live remotely but was never confirmed
    #[error("password change unconfirmed during {state}: {reason}")]
    UnconfirmedChange { state: RotationState, reason: String },

    /// Shutdown interrupted the run before submission
    #[error("rotation cancelled during {state}")]
    Cancelled { state: RotationState },

    /// State transition is not allowed
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: RotationState,
        to: RotationState,
    },

    /// Secrets or settings unusable at run time
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl RotationError {
    /// History classification of this failure.
    pub fn reason(&self) -> FailureReason {
        match self {
            RotationError::RateLimited { .. } => FailureReason::RateLimited,
            RotationError::AuthRejected(_) | RotationError::LoginRejected { .. } => {
                FailureReason::AuthRejected
            }
            RotationError::TransientExhausted { .. } => FailureReason::TransientNetwork,
            RotationError::RemoteRejected { .. } => FailureReason::RemoteRejected,
            RotationError::PasswordReuse { .. } => FailureReason::PasswordPolicy,
            RotationError::UnconfirmedChange { .. } => FailureReason::UnconfirmedChange,
            RotationError::Cancelled { .. } => FailureReason::Cancelled,
            RotationError::InvalidStateTransition { .. } | RotationError::Configuration { .. } => {
                FailureReason::Internal
            }
        }
    }
}

/// Errors from [`RotationService`](super::RotationService) and the scheduler
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Another run held the gate for longer than the busy grace
    #[error("another rotation is in progress (waited {}ms)", .waited.as_millis())]
    Busy { waited: Duration },

    /// An unconfirmed change blocks further runs
    #[error("unconfirmed password change from {at} must be resolved first")]
    UnresolvedChange { at: DateTime<Utc> },

    /// `resolve` was called with no pending change
    #[error("there is no unconfirmed change to resolve")]
    NothingToResolve,

    /// The scheduler task is gone
    #[error("scheduler is not running")]
    SchedulerStopped,

    /// The process lock could not be taken for a reason other than contention
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Credential(#[from] CredentialStoreError),

    #[error("configuration error: {0}")]
    Configuration(String),
}
