//! Interface to the remote account service
//!
//! The orchestrator only ever talks to [`RemoteAccountClient`]. Errors are
//! split into transient ones, which are retried with backoff, and
//! authoritative ones, which end the attempt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::codegen::{ConfirmationSignature, OneTimeCode};
use crate::core::SecretString;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpAccountClient;

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bearer token
    pub token: SecretString,
    /// Account the session belongs to, when the remote reports it
    pub account_id: Option<u64>,
}

/// A change the remote side wants confirmed before applying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub confirmation_id: String,
    /// Action tag to sign, e.g. `"conf"`
    pub tag: String,
    /// Unix seconds at which the remote issued the confirmation
    pub issued_at: i64,
}

/// Result of submitting a new password
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeResult {
    /// Applied immediately
    Completed,
    /// Applied once confirmed
    ConfirmationRequired(PendingConfirmation),
}

/// Result of a confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmResult {
    Confirmed,
    /// The remote had already accepted this confirmation; same outcome as
    /// [`ConfirmResult::Confirmed`].
    AlreadyConfirmed,
}

/// The action being confirmed, bound to this device and account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    pub confirmation_id: String,
    pub tag: String,
    pub issued_at: i64,
    pub device_id: String,
    pub account_id: u64,
}

impl ConfirmationPayload {
    pub fn new(pending: &PendingConfirmation, device_id: &str, account_id: u64) -> Self {
        Self {
            confirmation_id: pending.confirmation_id.clone(),
            tag: pending.tag.clone(),
            issued_at: pending.issued_at,
            device_id: device_id.to_string(),
            account_id,
        }
    }

    /// Bytes covered by the signature (the tag is signed separately):
    /// `i64_be issued_at || u64_be account_id || u32_be len || device_id ||
    /// u32_be len || confirmation_id`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.device_id.len() + self.confirmation_id.len());
        out.extend_from_slice(&self.issued_at.to_be_bytes());
        out.extend_from_slice(&self.account_id.to_be_bytes());
        out.extend_from_slice(&(self.device_id.len() as u32).to_be_bytes());
        out.extend_from_slice(self.device_id.as_bytes());
        out.extend_from_slice(&(self.confirmation_id.len() as u32).to_be_bytes());
        out.extend_from_slice(self.confirmation_id.as_bytes());
        out
    }
}

/// Why the remote refused to authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRejection {
    /// The one-time code was not accepted
    InvalidCode,
    /// Login or password wrong
    InvalidCredentials,
    /// The account is locked
    Locked,
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthRejection::InvalidCode => write!(f, "invalid one-time code"),
            AuthRejection::InvalidCredentials => write!(f, "invalid credentials"),
            AuthRejection::Locked => write!(f, "account locked"),
        }
    }
}

/// Errors returned by a [`RemoteAccountClient`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, timeout or a retryable server status
    #[error("transient remote error: {0}")]
    Transient(String),

    /// Authentication refused
    #[error("authentication rejected: {0}")]
    AuthRejected(AuthRejection),

    /// Request understood and refused
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether the call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// The remote account service.
///
/// Implementations must be cheap to call repeatedly: the orchestrator retries
/// transient failures, resubmitting the same password and the same
/// confirmation signature.
#[async_trait]
pub trait RemoteAccountClient: Send + Sync {
    /// Start a session with the current password and a one-time code.
    async fn login(
        &self,
        login: &str,
        password: &SecretString,
        code: &OneTimeCode,
    ) -> Result<Session, RemoteError>;

    /// Submit a new password.
    async fn change_password(
        &self,
        session: &Session,
        new_password: &SecretString,
    ) -> Result<ChangeResult, RemoteError>;

    /// Confirm a pending change. Must be idempotent for the same signature.
    async fn confirm(
        &self,
        session: &Session,
        signature: &ConfirmationSignature,
        payload: &ConfirmationPayload,
    ) -> Result<ConfirmResult, RemoteError>;
}
