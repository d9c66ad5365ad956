//! Rotation history records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::hash::SaltedHash;

/// Unique identifier for a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a record is a rotation attempt or an operator resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Rotation,
    Resolution,
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The scheduler found the rotation due
    Scheduled,
    /// An operator forced it
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Why a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Too many recent failures; no remote call was made
    RateLimited,
    /// The remote refused the login
    AuthRejected,
    /// Retries exhausted on a transient network error before any change
    TransientNetwork,
    /// The remote refused the new password
    RemoteRejected,
    /// No acceptable candidate could be generated
    PasswordPolicy,
    /// A change may have been applied remotely but was never confirmed
    UnconfirmedChange,
    /// Shutdown interrupted the run before the change was submitted
    Cancelled,
    /// Operator resolution: the unconfirmed change did not take effect
    ChangeNotApplied,
    /// Local failure unrelated to the remote
    Internal,
}

impl FailureReason {
    /// Failures that count toward the rate-limit window.
    ///
    /// Only outcomes that involved the remote side count; a rate-limited run
    /// must not extend its own window.
    pub fn counts_toward_rate_limit(self) -> bool {
        matches!(
            self,
            FailureReason::AuthRejected
                | FailureReason::TransientNetwork
                | FailureReason::RemoteRejected
                | FailureReason::UnconfirmedChange
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::RateLimited => "rate_limited",
            FailureReason::AuthRejected => "auth_rejected",
            FailureReason::TransientNetwork => "transient_network",
            FailureReason::RemoteRejected => "remote_rejected",
            FailureReason::PasswordPolicy => "password_policy",
            FailureReason::UnconfirmedChange => "unconfirmed_change",
            FailureReason::Cancelled => "cancelled",
            FailureReason::ChangeNotApplied => "change_not_applied",
            FailureReason::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// One immutable history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Hash of the password that was set, or attempted for a remote rejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<SaltedHash>,
    pub duration_ms: u64,
}

impl RotationRecord {
    pub fn success(
        trigger: Trigger,
        timestamp: DateTime<Utc>,
        password_hash: SaltedHash,
        duration: Duration,
    ) -> Self {
        Self {
            id: RecordId::new(),
            kind: RecordKind::Rotation,
            trigger,
            timestamp,
            outcome: Outcome::Success,
            reason: None,
            detail: None,
            password_hash: Some(password_hash),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failure(
        trigger: Trigger,
        timestamp: DateTime<Utc>,
        reason: FailureReason,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: RecordId::new(),
            kind: RecordKind::Rotation,
            trigger,
            timestamp,
            outcome: Outcome::Failure,
            reason: Some(reason),
            detail: Some(detail.into()),
            password_hash: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Operator resolution of a pending unconfirmed change.
    ///
    /// `applied` with a hash records a success (the new password is live);
    /// otherwise a `change_not_applied` failure.
    pub fn resolution(timestamp: DateTime<Utc>, applied: Option<SaltedHash>) -> Self {
        let (outcome, reason, detail) = match applied {
            Some(_) => (Outcome::Success, None, "change confirmed applied by operator"),
            None => (
                Outcome::Failure,
                Some(FailureReason::ChangeNotApplied),
                "change confirmed not applied by operator",
            ),
        };
        Self {
            id: RecordId::new(),
            kind: RecordKind::Resolution,
            trigger: Trigger::Manual,
            timestamp,
            outcome,
            reason,
            detail: Some(detail.to_string()),
            password_hash: applied,
            duration_ms: 0,
        }
    }

    /// Attach the hash of an attempted password.
    pub fn with_password_hash(mut self, hash: SaltedHash) -> Self {
        self.password_hash = Some(hash);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Whether this record counts toward the rate-limit window.
    pub fn counts_toward_rate_limit(&self) -> bool {
        self.kind == RecordKind::Rotation
            && self.outcome == Outcome::Failure
            && self.reason.is_some_and(FailureReason::counts_toward_rate_limit)
    }
}
