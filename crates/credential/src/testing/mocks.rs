use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::codegen::{ConfirmationSignature, OneTimeCode};
use crate::core::SecretString;
use crate::password::{PasswordCandidate, PasswordGenerator};
use crate::remote::{
    ChangeResult, ConfirmResult, ConfirmationPayload, RemoteAccountClient, RemoteError, Session,
};

/// Remote account service that replays queued responses.
///
/// Each call pops the next queued response for its operation. When a queue is
/// empty the call succeeds: login returns a session, a change completes
/// without confirmation, a confirmation is accepted.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    logins: Mutex<VecDeque<Result<Session, RemoteError>>>,
    changes: Mutex<VecDeque<Result<ChangeResult, RemoteError>>>,
    confirms: Mutex<VecDeque<Result<ConfirmResult, RemoteError>>>,
    login_count: AtomicU32,
    change_count: AtomicU32,
    confirm_count: AtomicU32,
    codes: Mutex<Vec<(u64, String)>>,
    submitted: Mutex<Vec<SecretString>>,
    signatures: Mutex<Vec<(ConfirmationSignature, ConfirmationPayload)>>,
    change_delay: Option<Duration>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every change call take `delay` before answering.
    pub fn with_change_delay(mut self, delay: Duration) -> Self {
        self.change_delay = Some(delay);
        self
    }

    pub fn push_login(&self, result: Result<Session, RemoteError>) -> &Self {
        self.logins.lock().push_back(result);
        self
    }

    pub fn push_change(&self, result: Result<ChangeResult, RemoteError>) -> &Self {
        self.changes.lock().push_back(result);
        self
    }

    pub fn push_confirm(&self, result: Result<ConfirmResult, RemoteError>) -> &Self {
        self.confirms.lock().push_back(result);
        self
    }

    pub fn login_count(&self) -> u32 {
        self.login_count.load(Ordering::SeqCst)
    }

    pub fn change_count(&self) -> u32 {
        self.change_count.load(Ordering::SeqCst)
    }

    pub fn confirm_count(&self) -> u32 {
        self.confirm_count.load(Ordering::SeqCst)
    }

    /// Calls of any kind.
    pub fn total_calls(&self) -> u32 {
        self.login_count() + self.change_count() + self.confirm_count()
    }

    /// `(step, code)` for every login attempt, in order.
    pub fn codes(&self) -> Vec<(u64, String)> {
        self.codes.lock().clone()
    }

    /// Every password submitted through `change_password`, in order.
    pub fn submitted(&self) -> Vec<SecretString> {
        self.submitted.lock().clone()
    }

    /// Every confirmation received, in order.
    pub fn signatures(&self) -> Vec<(ConfirmationSignature, ConfirmationPayload)> {
        self.signatures.lock().clone()
    }

    /// Session handed out by default.
    pub fn session() -> Session {
        Session {
            token: SecretString::new("session-token"),
            account_id: None,
        }
    }
}

#[async_trait]
impl RemoteAccountClient for ScriptedRemote {
    async fn login(
        &self,
        _login: &str,
        _password: &SecretString,
        code: &OneTimeCode,
    ) -> Result<Session, RemoteError> {
        self.login_count.fetch_add(1, Ordering::SeqCst);
        self.codes
            .lock()
            .push((code.step(), code.as_str().to_string()));
        let next = self.logins.lock().pop_front();
        next.unwrap_or_else(|| Ok(Self::session()))
    }

    async fn change_password(
        &self,
        _session: &Session,
        new_password: &SecretString,
    ) -> Result<ChangeResult, RemoteError> {
        self.change_count.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().push(new_password.clone());
        if let Some(delay) = self.change_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.changes.lock().pop_front();
        next.unwrap_or(Ok(ChangeResult::Completed))
    }

    async fn confirm(
        &self,
        _session: &Session,
        signature: &ConfirmationSignature,
        payload: &ConfirmationPayload,
    ) -> Result<ConfirmResult, RemoteError> {
        self.confirm_count.fetch_add(1, Ordering::SeqCst);
        self.signatures
            .lock()
            .push((*signature, payload.clone()));
        let next = self.confirms.lock().pop_front();
        next.unwrap_or(Ok(ConfirmResult::Confirmed))
    }
}

/// Password source returning preset passwords in order, then repeating the
/// last one.
#[derive(Debug)]
pub struct FixedPasswords {
    queue: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicU32,
}

impl FixedPasswords {
    pub fn new<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: VecDeque<String> = passwords.into_iter().map(Into::into).collect();
        let last = queue.back().cloned().unwrap_or_default();
        Self {
            queue: Mutex::new(queue),
            last: Mutex::new(last),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of candidates handed out.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PasswordGenerator for FixedPasswords {
    fn generate(&self) -> PasswordCandidate {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().pop_front();
        let password = match next {
            Some(p) => {
                *self.last.lock() = p.clone();
                p
            }
            None => self.last.lock().clone(),
        };
        PasswordCandidate::from_secret(SecretString::new(password))
    }
}
