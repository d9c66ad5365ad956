//! Rotator Credential - scheduled password rotation for a remote account
//!
//! Keeps the password of one remote account fresh: on a fixed interval it
//! logs in with a one-time code, sets a newly generated password, confirms
//! the change with a signed confirmation when the service asks for one, and
//! records every attempt in an integrity-checked history file.
//!
//! # Features
//!
//! - **One-time codes** - 30 s time-step codes with adjacent-step retry for
//!   clock skew, plus HMAC confirmation signatures
//! - **Password policy** - configurable character classes, strength scoring,
//!   no reuse of recent passwords
//! - **Tamper-evident history** - append-only, hash-chained, crash-safe
//! - **Safe failure** - the stored password changes only after the remote
//!   side accepted the new one
#![forbid(unsafe_code)]

/// One-time codes and confirmation signatures
pub mod codegen;
/// Configuration types and validation
pub mod config;
/// Core types: secrets, the account credential, clocks
pub mod core;
/// Rotation history
pub mod history;
/// Rotation outcome notifications
pub mod notify;
/// Password policy and generation
pub mod password;
/// Remote account service interface
pub mod remote;
/// Rotation orchestration, scheduling and the run gate
pub mod rotation;
/// Credential persistence
pub mod store;
/// Fakes and fixtures for tests
pub mod testing;
/// Filesystem helpers
pub mod utils;

// ── Root re-exports ─────────────────────────────────────────────────────────

pub use crate::codegen::{CodeError, CodeGenerator, ConfirmationSignature, ConfirmationSigner};
pub use crate::config::{ConfigError, RotatorConfig};
pub use crate::core::{AccountCredential, SecretString};
pub use crate::history::{HistoryError, HistoryStore, RotationRecord};
pub use crate::rotation::{RotationError, RotationOrchestrator, RotationService, ServiceError};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::codegen::{CodeGenerator, ConfirmationSigner, OneTimeCode};
    pub use crate::config::{ConfigError, RotatorConfig};
    pub use crate::core::{AccountCredential, Clock, SecretString, SystemClock};
    pub use crate::history::{
        FailureReason, HistoryError, HistoryStore, Outcome, RotationRecord, Trigger,
    };
    pub use crate::notify::{LogNotifier, Notifier, RotationEvent};
    pub use crate::password::{PasswordConfig, PasswordGenerator, PasswordPolicy};
    pub use crate::remote::{RemoteAccountClient, RemoteError};
    pub use crate::rotation::{
        RotationError, RotationOrchestrator, RotationPolicy, RotationSchedule, RotationService,
        RunOutcome, RunReport, Scheduler, SchedulerHandle, ServiceError, StatusReport,
    };
    pub use crate::store::{CredentialStore, FileCredentialStore};

    #[cfg(feature = "http")]
    pub use crate::remote::HttpAccountClient;
}
