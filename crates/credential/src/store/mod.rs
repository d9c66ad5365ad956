//! Persistence for the account credential
//!
//! After every successful rotation the new password must survive a restart,
//! so the orchestrator writes the credential back through [`CredentialStore`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{AccountCredential, SecretString};
use crate::utils::atomic_write;

/// Credential persistence errors
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credential file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads and saves the account credential.
pub trait CredentialStore: Send + Sync + Debug {
    fn load(&self) -> Result<AccountCredential, CredentialStoreError>;

    fn save(&self, credential: &AccountCredential) -> Result<(), CredentialStoreError>;
}

/// On-disk shape; plaintext, so the file is written owner-only.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct CredentialFile {
    login: String,
    password: String,
    shared_secret: String,
    identity_secret: String,
    device_id: String,
    #[serde(alias = "steamid")]
    account_id: u64,
}

impl From<&AccountCredential> for CredentialFile {
    fn from(credential: &AccountCredential) -> Self {
        Self {
            login: credential.login.clone(),
            password: credential.password().expose_secret(str::to_string),
            shared_secret: credential.shared_secret.expose_secret(str::to_string),
            identity_secret: credential.identity_secret.expose_secret(str::to_string),
            device_id: credential.device_id.clone(),
            account_id: credential.account_id,
        }
    }
}

impl CredentialFile {
    fn to_credential(&self) -> AccountCredential {
        AccountCredential::new(
            self.login.clone(),
            SecretString::new(self.password.clone()),
            SecretString::new(self.shared_secret.clone()),
            SecretString::new(self.identity_secret.clone()),
            self.device_id.clone(),
            self.account_id,
        )
    }
}

/// JSON credential file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<AccountCredential, CredentialStoreError> {
        let bytes = zeroize::Zeroizing::new(
            std::fs::read(&self.path).map_err(|e| self.io_error(e))?,
        );
        let file: CredentialFile =
            serde_json::from_slice(&bytes).map_err(|source| CredentialStoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(file.to_credential())
    }

    fn save(&self, credential: &AccountCredential) -> Result<(), CredentialStoreError> {
        let file = CredentialFile::from(credential);
        let json = zeroize::Zeroizing::new(serde_json::to_vec_pretty(&file).map_err(|source| {
            CredentialStoreError::Parse {
                path: self.path.clone(),
                source,
            }
        })?);
        atomic_write(&self.path, &json).map_err(|e| self.io_error(e))?;
        tracing::debug!(path = %self.path.display(), "Saved account credential");
        Ok(())
    }
}

/// In-memory store for embedding and tests.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    credential: Mutex<AccountCredential>,
    saves: AtomicU32,
    fail_saves: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new(credential: AccountCredential) -> Self {
        Self {
            credential: Mutex::new(credential),
            saves: AtomicU32::new(0),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// The last saved credential.
    pub fn current(&self) -> AccountCredential {
        self.credential.lock().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<AccountCredential, CredentialStoreError> {
        Ok(self.credential.lock().clone())
    }

    fn save(&self, credential: &AccountCredential) -> Result<(), CredentialStoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CredentialStoreError::Io {
                path: PathBuf::from("<memory>"),
                source: io::Error::other("save disabled"),
            });
        }
        *self.credential.lock() = credential.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
