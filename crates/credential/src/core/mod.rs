//! Core types shared by every other module

mod clock;
mod credential;
mod secret;

pub use clock::{Clock, ManualClock, SystemClock, add_std, sub_std, until};
pub use credential::AccountCredential;
pub use secret::SecretString;
