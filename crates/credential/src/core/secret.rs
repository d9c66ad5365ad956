//! Secret string type with automatic zeroization
//!
//! Provides [`SecretString`] with controlled access via closure API
//! so passwords and shared secrets are never copied out by accident.

use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret string with automatic memory zeroization
///
/// Secrets are never exposed directly - they must be accessed within
/// a closure scope using [`expose_secret`]. Memory is zeroed when the
/// value is dropped, and `Debug`, `Display` and `Serialize` all print
/// `[REDACTED]`.
///
/// [`expose_secret`]: SecretString::expose_secret
///
/// # Examples
///
/// ```
/// use rotator_credential::SecretString;
///
/// let secret = SecretString::new("hunter2");
/// let len = secret.expose_secret(|value| value.len());
/// assert_eq!(len, 7);
/// assert_eq!(format!("{secret:?}"), "[REDACTED]");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Creates a new secret from any string-like value
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self { inner: s.into() }
    }

    /// Accesses the secret value within a closure scope
    pub fn expose_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        f(&self.inner)
    }

    /// Returns the length in bytes without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks if empty without exposing content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Constant-time equality against another secret.
    pub fn matches(&self, other: &SecretString) -> bool {
        self.inner.as_bytes().ct_eq(other.inner.as_bytes()).into()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Serialize as redacted; persistence that needs the plaintext goes through
// `expose_secret` explicitly.
impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}
