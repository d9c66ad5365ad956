//! Rotation outcome notifications
//!
//! Every recorded run produces one [`RotationEvent`]. Delivery goes through
//! [`Notifier`]; [`LogNotifier`] writes events to the tracing pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{FailureReason, Outcome, RecordId, RotationRecord, Trigger};

/// Notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub notify_on_success: bool,
    pub notify_on_error: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_on_success: true,
            notify_on_error: true,
        }
    }
}

/// Outcome of a recorded run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RotationEvent {
    /// Password rotated and confirmed
    Succeeded {
        record_id: RecordId,
        trigger: Trigger,
        at: DateTime<Utc>,
    },

    /// Run failed; the stored password is unchanged
    Failed {
        record_id: RecordId,
        trigger: Trigger,
        at: DateTime<Utc>,
        reason: FailureReason,
        detail: Option<String>,
    },

    /// The remote may hold a new password nobody has confirmed
    Unconfirmed {
        record_id: RecordId,
        at: DateTime<Utc>,
        detail: Option<String>,
    },
}

impl RotationEvent {
    pub fn from_record(record: &RotationRecord) -> Self {
        match (record.outcome, record.reason) {
            (Outcome::Success, _) => RotationEvent::Succeeded {
                record_id: record.id,
                trigger: record.trigger,
                at: record.timestamp,
            },
            (Outcome::Failure, Some(FailureReason::UnconfirmedChange)) => {
                RotationEvent::Unconfirmed {
                    record_id: record.id,
                    at: record.timestamp,
                    detail: record.detail.clone(),
                }
            }
            (Outcome::Failure, reason) => RotationEvent::Failed {
                record_id: record.id,
                trigger: record.trigger,
                at: record.timestamp,
                reason: reason.unwrap_or(FailureReason::Internal),
                detail: record.detail.clone(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RotationEvent::Succeeded { .. })
    }
}

/// Delivers rotation events.
///
/// Delivery failures are the notifier's concern: they must never fail a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &RotationEvent);
}

/// Writes events to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    config: NotificationConfig,
}

impl LogNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    fn wants(&self, event: &RotationEvent) -> bool {
        self.config.enabled
            && if event.is_success() {
                self.config.notify_on_success
            } else {
                self.config.notify_on_error
            }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &RotationEvent) {
        if !self.wants(event) {
            return;
        }
        match event {
            RotationEvent::Succeeded {
                record_id,
                trigger,
                at,
            } => tracing::info!(
                target: "rotator::notify",
                record_id = %record_id,
                trigger = %trigger,
                at = %at,
                "Password rotated"
            ),
            RotationEvent::Failed {
                record_id,
                trigger,
                at,
                reason,
                detail,
            } => tracing::warn!(
                target: "rotator::notify",
                record_id = %record_id,
                trigger = %trigger,
                at = %at,
                reason = %reason,
                detail = detail.as_deref().unwrap_or(""),
                "Password rotation failed"
            ),
            RotationEvent::Unconfirmed {
                record_id,
                at,
                detail,
            } => tracing::error!(
                target: "rotator::notify",
                record_id = %record_id,
                at = %at,
                detail = detail.as_deref().unwrap_or(""),
                "Password change unconfirmed; run `rotator resolve` once the live password is known"
            ),
        }
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &RotationEvent) {}
}
