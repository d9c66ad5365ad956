//! Password policy: candidate generation and strength scoring

mod policy;
mod strength;

pub use policy::{
    AMBIGUOUS, CharClass, MAX_LENGTH, MIN_LENGTH, PasswordCandidate, PasswordConfig,
    PasswordGenerator, PasswordPolicy, PolicyError, generate,
};
pub use strength::{Criterion, MAX_POINTS, Strength, StrengthReport, score};
