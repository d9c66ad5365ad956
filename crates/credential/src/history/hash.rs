use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::core::SecretString;

const SALT_LEN: usize = 16;

/// Salted SHA-256 of a password, kept in history for reuse checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaltedHash {
    /// Hex-encoded random salt
    pub salt: String,
    /// Hex-encoded `SHA-256(salt || password)`
    pub digest: String,
}

impl SaltedHash {
    /// Hash `password` under a fresh random salt.
    pub fn new(password: &SecretString) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        Self {
            salt: hex::encode(salt),
            digest: hex::encode(digest(&salt, password)),
        }
    }

    /// Constant-time check of `password` against this hash.
    ///
    /// A hash with undecodable fields never matches.
    pub fn matches(&self, password: &SecretString) -> bool {
        let (Ok(salt), Ok(expected)) = (hex::decode(&self.salt), hex::decode(&self.digest)) else {
            return false;
        };
        digest(&salt, password).ct_eq(expected.as_slice()).into()
    }
}

fn digest(salt: &[u8], password: &SecretString) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    password.expose_secret(|p| hasher.update(p.as_bytes()));
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_same_password_only() {
        let hash = SaltedHash::new(&SecretString::new("Correct-Horse-9"));
        assert!(hash.matches(&SecretString::new("Correct-Horse-9")));
        assert!(!hash.matches(&SecretString::new("Correct-Horse-8")));
    }

    #[test]
    fn test_salts_differ() {
        let password = SecretString::new("same");
        let a = SaltedHash::new(&password);
        let b = SaltedHash::new(&password);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_garbage_never_matches() {
        let hash = SaltedHash {
            salt: "zz".into(),
            digest: "00".into(),
        };
        assert!(!hash.matches(&SecretString::new("anything")));
    }
}
