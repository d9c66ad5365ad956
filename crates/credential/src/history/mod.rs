//! Append-only, integrity-checked rotation history
//!
//! Every run ends in exactly one [`RotationRecord`]. The log is the only
//! source for scheduling and rate limiting: the next due time is derived from
//! the last success and the failure count from records inside the trailing
//! window, so there is no counter to drift or reset.

mod hash;
mod record;
mod store;

pub use hash::SaltedHash;
pub use record::{FailureReason, Outcome, RecordId, RecordKind, RotationRecord, Trigger};
pub use store::{HistoryError, HistoryStore};
