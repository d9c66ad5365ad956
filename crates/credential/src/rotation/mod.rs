//! Password Rotation
//!
//! One rotation run moves through a fixed state machine (see
//! [`RotationState`]) and always ends by writing exactly one history record.
//!
//! # Failure Handling
//!
//! - **Rate limit**: with too many recent failures a run is refused before any
//!   remote call.
//! - **Clock skew**: a rejected one-time code is retried once with the code
//!   from the adjacent 30 s step.
//! - **Retry**: login and confirmation retry transient errors with
//!   exponential backoff. The change request is sent once.
//! - **Unconfirmed changes**: if the outcome of a submitted change is unknown,
//!   the stored password is kept and further runs are refused until an
//!   operator resolves it.
//!
//! # Concurrency Control
//!
//! Runs serialize on an advisory lock next to the history file, so a manual
//! run and the scheduler (in this or another process) never overlap.
//!
//! # Example
//!
//! ```rust,no_run
//! use rotator_credential::prelude::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(remote: Arc<dyn RemoteAccountClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RotatorConfig::default();
//! let store = Arc::new(FileCredentialStore::new(&config.account.credential_file));
//! let credential = store.load()?;
//! config.preflight(&credential)?;
//!
//! let history = Arc::new(HistoryStore::open(&config.history.path, config.history.max_records)?);
//! let orchestrator = RotationOrchestrator::new(
//!     remote,
//!     history,
//!     Arc::new(PasswordPolicy::new(config.password.clone())?),
//!     store,
//!     RotationPolicy::from_config(&config),
//! );
//! let service = RotationService::new(orchestrator, credential);
//!
//! match service.rotate(Trigger::Manual, &CancellationToken::new()).await? {
//!     RunOutcome::Completed(report) => println!("success: {}", report.is_success()),
//!     RunOutcome::NotDue(schedule) => println!("next due {}", schedule.next_due_at),
//!     RunOutcome::Throttled { error, .. } => println!("refused: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod state;

pub use error::{RotationError, ServiceError};
pub use gate::{RunGate, lock_path};
pub use orchestrator::{
    MAX_CANDIDATES, RotationOrchestrator, RotationPolicy, RunOutcome, RunReport,
};
pub use retry::{CallFailure, CallGuard, Interrupted, RetryPolicy, with_retry};
pub use schedule::RotationSchedule;
pub use scheduler::{MAX_SLEEP, Scheduler, SchedulerHandle};
pub use service::{RotationService, StatusReport};
pub use state::RotationState;
