use chrono::{DateTime, TimeZone, Utc};

use crate::core::{AccountCredential, SecretString};

/// RFC 6238 test key (`"12345678901234567890"`), base64.
pub const SHARED_SECRET: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=";

/// 20-byte identity key (`"abcdefghijklmnopqrst"`), base64.
pub const IDENTITY_SECRET: &str = "YWJjZGVmZ2hpamtsbW5vcHFyc3Q=";

/// Password of [`test_credential`].
pub const INITIAL_PASSWORD: &str = "Initial-Passw0rd!";

pub const DEVICE_ID: &str = "android:6f1c2b7e-0d3a-4e55-9a1b-2c3d4e5f6a7b";

pub const ACCOUNT_ID: u64 = 76_561_198_000_000_042;

/// Credential with known secrets.
pub fn test_credential() -> AccountCredential {
    AccountCredential::new(
        "rotator-test",
        SecretString::new(INITIAL_PASSWORD),
        SecretString::new(SHARED_SECRET),
        SecretString::new(IDENTITY_SECRET),
        DEVICE_ID,
        ACCOUNT_ID,
    )
}

/// 2024-05-01 08:00:15 UTC, in the first half of a 30 s code window.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 15)
        .single()
        .unwrap_or_default()
}
