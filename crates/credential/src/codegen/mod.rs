//! One-time login codes and confirmation signatures
//!
//! Codes follow RFC 6238 (TOTP) with HMAC-SHA1, a 30 second step and 6 to 8
//! digits. Both secrets are base64 text decoding to exactly 20 bytes; anything
//! else is rejected at construction so misconfiguration surfaces before any
//! network attempt.
//!
//! # Examples
//!
//! ```
//! use rotator_credential::SecretString;
//! use rotator_credential::codegen::CodeGenerator;
//!
//! // RFC 6238 test secret "12345678901234567890"
//! let secret = SecretString::new("MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=");
//! let generator = CodeGenerator::new(&secret, 8).unwrap();
//! assert_eq!(generator.code_at_step(1).as_str(), "94287082");
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::core::SecretString;

type HmacSha1 = Hmac<Sha1>;

/// Length of one TOTP window in seconds.
pub const TIME_STEP_SECS: u64 = 30;

/// Required decoded length of shared and identity secrets.
pub const SECRET_LEN: usize = 20;

/// Default code length.
pub const DEFAULT_DIGITS: u32 = 6;

/// Errors raised while loading code or signing secrets
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The secret is not valid base64
    #[error("{field} is not valid base64: {reason}")]
    MalformedSecret { field: &'static str, reason: String },

    /// The secret decoded to the wrong number of bytes
    #[error("{field} must decode to {expected} bytes, got {actual}")]
    SecretLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Unsupported code length
    #[error("code length must be between 6 and 8 digits, got {0}")]
    InvalidDigits(u32),
}

fn decode_secret(field: &'static str, secret: &SecretString) -> Result<Zeroizing<Vec<u8>>, CodeError> {
    let bytes = secret
        .expose_secret(|text| STANDARD.decode(text.trim()))
        .map(Zeroizing::new)
        .map_err(|e| CodeError::MalformedSecret {
            field,
            reason: e.to_string(),
        })?;

    if bytes.len() != SECRET_LEN {
        return Err(CodeError::SecretLength {
            field,
            expected: SECRET_LEN,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

fn keyed_mac(field: &'static str, key: &[u8]) -> Result<HmacSha1, CodeError> {
    HmacSha1::new_from_slice(key).map_err(|e| CodeError::MalformedSecret {
        field,
        reason: e.to_string(),
    })
}

fn step_start(step: u64) -> DateTime<Utc> {
    step.checked_mul(TIME_STEP_SECS)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn unix_secs(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp()).unwrap_or(0)
}

/// A one-time login code. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct OneTimeCode {
    code: String,
    step: u64,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
}

impl OneTimeCode {
    /// The zero-padded decimal code.
    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// The TOTP counter this code was derived from.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Start of the window in which the code is current.
    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    /// End (exclusive) of the window in which the code is current.
    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }
}

impl fmt::Debug for OneTimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeCode")
            .field("code", &"[REDACTED]")
            .field("step", &self.step)
            .field("valid_from", &self.valid_from)
            .field("valid_until", &self.valid_until)
            .finish()
    }
}

/// TOTP generator keyed by the account's shared secret.
#[derive(Clone)]
pub struct CodeGenerator {
    mac: HmacSha1,
    digits: u32,
}

impl fmt::Debug for CodeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeGenerator")
            .field("digits", &self.digits)
            .finish()
    }
}

impl CodeGenerator {
    /// Build a generator from a base64 shared secret.
    pub fn new(shared_secret: &SecretString, digits: u32) -> Result<Self, CodeError> {
        if !(6..=8).contains(&digits) {
            return Err(CodeError::InvalidDigits(digits));
        }
        let key = decode_secret("shared_secret", shared_secret)?;
        Ok(Self {
            mac: keyed_mac("shared_secret", &key)?,
            digits,
        })
    }

    /// Number of digits in produced codes.
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// TOTP counter for `now`.
    pub fn step_for(now: DateTime<Utc>) -> u64 {
        unix_secs(now) / TIME_STEP_SECS
    }

    /// Code for an explicit counter value.
    pub fn code_at_step(&self, step: u64) -> OneTimeCode {
        let mut mac = self.mac.clone();
        mac.update(&step.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset],
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]) & 0x7fff_ffff;
        let value = binary % 10u32.pow(self.digits);

        OneTimeCode {
            code: format!("{value:0width$}", width = self.digits as usize),
            step,
            valid_from: step_start(step),
            valid_until: step_start(step.saturating_add(1)),
        }
    }

    /// Code for the window containing `now`.
    pub fn current_code(&self, now: DateTime<Utc>) -> OneTimeCode {
        self.code_at_step(Self::step_for(now))
    }

    /// Code for the neighbouring window nearest to `now`.
    ///
    /// In the first half of a window the previous step is returned, in the
    /// second half the next one. Used for the single clock-skew retry.
    pub fn adjacent_code(&self, now: DateTime<Utc>) -> OneTimeCode {
        let secs = unix_secs(now);
        let step = secs / TIME_STEP_SECS;
        let adjacent = if secs % TIME_STEP_SECS < TIME_STEP_SECS / 2 {
            step.saturating_sub(1)
        } else {
            step.saturating_add(1)
        };
        // Step 0 in its first half has no predecessor.
        if adjacent == step {
            self.code_at_step(step + 1)
        } else {
            self.code_at_step(adjacent)
        }
    }
}

/// An HMAC-SHA1 confirmation signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationSignature([u8; 20]);

impl ConfirmationSignature {
    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Standard base64 encoding, as sent on the wire.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for ConfirmationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfirmationSignature({})", self.to_base64())
    }
}

/// Signs pending account actions with the identity secret.
#[derive(Clone)]
pub struct ConfirmationSigner {
    mac: HmacSha1,
}

impl fmt::Debug for ConfirmationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfirmationSigner")
    }
}

impl ConfirmationSigner {
    pub fn new(identity_secret: &SecretString) -> Result<Self, CodeError> {
        let key = decode_secret("identity_secret", identity_secret)?;
        Ok(Self {
            mac: keyed_mac("identity_secret", &key)?,
        })
    }

    /// HMAC-SHA1 over `u32_be(len(tag)) || tag || payload`.
    pub fn sign(&self, tag: &str, payload: &[u8]) -> ConfirmationSignature {
        let mut mac = self.mac.clone();
        mac.update(&(tag.len() as u32).to_be_bytes());
        mac.update(tag.as_bytes());
        mac.update(payload);
        let mut out = [0u8; 20];
        out.copy_from_slice(&mac.finalize().into_bytes());
        ConfirmationSignature(out)
    }
}

/// One-shot form of [`ConfirmationSigner::sign`].
pub fn confirmation_signature(
    identity_secret: &SecretString,
    tag: &str,
    payload: &[u8],
) -> Result<ConfirmationSignature, CodeError> {
    Ok(ConfirmationSigner::new(identity_secret)?.sign(tag, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const RFC_SECRET: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn generator(digits: u32) -> CodeGenerator {
        CodeGenerator::new(&SecretString::new(RFC_SECRET), digits).unwrap()
    }

    #[rstest]
    #[case(59, "94287082")]
    #[case(1_111_111_109, "07081804")]
    #[case(1_111_111_111, "14050471")]
    #[case(1_234_567_890, "89005924")]
    #[case(2_000_000_000, "69279037")]
    fn test_rfc6238_sha1_vectors(#[case] secs: i64, #[case] expected: &str) {
        assert_eq!(generator(8).current_code(at(secs)).as_str(), expected);
    }

    #[rstest]
    #[case(0, "755224")]
    #[case(1, "287082")]
    #[case(2, "359152")]
    #[case(9, "520489")]
    fn test_six_digit_codes(#[case] step: u64, #[case] expected: &str) {
        assert_eq!(generator(6).code_at_step(step).as_str(), expected);
    }

    #[test]
    fn test_code_window_bounds() {
        let code = generator(6).current_code(at(59));
        assert_eq!(code.step(), 1);
        assert_eq!(code.valid_from(), at(30));
        assert_eq!(code.valid_until(), at(60));
    }

    #[test]
    fn test_adjacent_code_picks_nearest_boundary() {
        let generator = generator(6);
        // 65 is early in step 2: previous step
        assert_eq!(generator.adjacent_code(at(65)).step(), 1);
        // 85 is late in step 2: next step
        assert_eq!(generator.adjacent_code(at(85)).step(), 3);
        assert_ne!(
            generator.adjacent_code(at(65)).as_str(),
            generator.current_code(at(65)).as_str()
        );
    }

    #[test]
    fn test_adjacent_code_at_epoch() {
        assert_eq!(generator(6).adjacent_code(at(0)).step(), 1);
    }

    #[test]
    fn test_rejects_malformed_secret() {
        let err = CodeGenerator::new(&SecretString::new("not base64 !!"), 6).unwrap_err();
        assert!(matches!(err, CodeError::MalformedSecret { field: "shared_secret", .. }));
    }

    #[test]
    fn test_rejects_wrong_length_secret() {
        // 16 bytes
        let err = CodeGenerator::new(&SecretString::new("MDEyMzQ1Njc4OWFiY2RlZg=="), 6).unwrap_err();
        assert_eq!(
            err,
            CodeError::SecretLength {
                field: "shared_secret",
                expected: 20,
                actual: 16
            }
        );
    }

    #[rstest]
    #[case(5)]
    #[case(9)]
    fn test_rejects_digits_out_of_range(#[case] digits: u32) {
        let err = CodeGenerator::new(&SecretString::new(RFC_SECRET), digits).unwrap_err();
        assert_eq!(err, CodeError::InvalidDigits(digits));
    }

    #[test]
    fn test_confirmation_signature_is_deterministic() {
        let secret = SecretString::new(RFC_SECRET);
        let a = confirmation_signature(&secret, "conf", b"payload").unwrap();
        let b = confirmation_signature(&secret, "conf", b"payload").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_base64().len(), 28);
    }

    #[test]
    fn test_confirmation_signature_binds_tag_boundary() {
        let signer = ConfirmationSigner::new(&SecretString::new(RFC_SECRET)).unwrap();
        // Same concatenated bytes, different split between tag and payload.
        let a = signer.sign("conf", b"xpayload");
        let b = signer.sign("confx", b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn test_one_time_code_debug_redacted() {
        let code = generator(6).code_at_step(0);
        assert!(!format!("{code:?}").contains("755224"));
    }
}
