use super::SecretString;

/// The account being rotated.
///
/// The password is private: it is replaced only through
/// [`commit_password`](Self::commit_password), which the orchestrator calls
/// after the remote side has confirmed a change and the service calls when an
/// operator resolves an unconfirmed one.
#[derive(Debug, Clone)]
pub struct AccountCredential {
    /// Login name.
    pub login: String,
    password: SecretString,
    /// Base64 key for one-time login codes.
    pub shared_secret: SecretString,
    /// Base64 key for confirmation signatures.
    pub identity_secret: SecretString,
    /// Device identifier bound into confirmations.
    pub device_id: String,
    /// Numeric account identifier bound into confirmations.
    pub account_id: u64,
}

impl AccountCredential {
    pub fn new(
        login: impl Into<String>,
        password: SecretString,
        shared_secret: SecretString,
        identity_secret: SecretString,
        device_id: impl Into<String>,
        account_id: u64,
    ) -> Self {
        Self {
            login: login.into(),
            password,
            shared_secret,
            identity_secret,
            device_id: device_id.into(),
            account_id,
        }
    }

    /// The password currently live on the remote account.
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub(crate) fn commit_password(&mut self, password: SecretString) {
        self.password = password;
    }
}
