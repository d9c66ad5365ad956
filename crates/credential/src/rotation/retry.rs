//! Retry Logic with Exponential Backoff
//!
//! Remote calls are retried only on transient errors, with a bounded number
//! of attempts. Every call and every backoff sleep runs under a [`CallGuard`]
//! so shutdown can interrupt them: a sleep ends at once, an in-flight call is
//! given a grace period first.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::remote::RemoteError;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential)
    pub backoff_multiplier: f32,

    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Apply ±10% jitter
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for given attempt number (zero-based)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_ms = self.initial_backoff.as_millis() as f32;
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let mut backoff_ms = base_ms * multiplier;

        if self.jitter {
            backoff_ms *= rand::rng().random_range(0.9..=1.1);
        }

        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }
}

/// Shutdown interrupted a call or a backoff sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted by shutdown")]
pub struct Interrupted;

/// Runs remote calls and sleeps under a cancellation token.
#[derive(Debug, Clone)]
pub struct CallGuard {
    cancel: CancellationToken,
    grace: Duration,
}

impl CallGuard {
    pub fn new(cancel: CancellationToken, grace: Duration) -> Self {
        Self { cancel, grace }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `call` to completion unless cancellation fires and the call then
    /// outlives the grace period.
    pub async fn run<F: Future>(&self, call: F) -> Result<F::Output, Interrupted> {
        tokio::pin!(call);
        tokio::select! {
            biased;
            out = &mut call => Ok(out),
            () = self.cancel.cancelled() => {
                timeout(self.grace, &mut call).await.map_err(|_| Interrupted)
            }
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        tokio::select! {
            () = sleep(duration) => Ok(()),
            () = self.cancel.cancelled() => Err(Interrupted),
        }
    }
}

/// Why a retried call gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// Authoritative error, or transient errors on every attempt
    Remote { error: RemoteError, attempts: u32 },
    /// Shutdown interrupted the call or a backoff sleep
    Interrupted { attempts: u32 },
}

/// Retry `f` on transient errors according to `policy`.
///
/// `f` is called again for every attempt, so callers that must resubmit the
/// same payload capture it by reference.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    guard: &CallGuard,
    mut f: F,
) -> Result<T, CallFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = guard
            .run(f())
            .await
            .map_err(|Interrupted| CallFailure::Interrupted { attempts: attempt })?;

        match result {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff_duration(attempt - 1);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %error,
                    "Retry attempt failed"
                );
                guard
                    .sleep(backoff)
                    .await
                    .map_err(|Interrupted| CallFailure::Interrupted { attempts: attempt })?;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(
                        operation,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                }
                return Err(CallFailure::Remote {
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}
