//! Password strength scoring
//!
//! An eight point rubric: up to three points for length (8, 12 and 16
//! characters), one each for lowercase, uppercase and digits, and two for
//! special characters.

use serde::Serialize;
use std::fmt;

use super::policy::{AMBIGUOUS, CharClass};

/// Highest possible score.
pub const MAX_POINTS: u8 = 8;

/// Coarse strength label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl Strength {
    pub fn from_points(points: u8) -> Self {
        match points {
            0 => Strength::VeryWeak,
            1..=2 => Strength::Weak,
            3..=4 => Strength::Medium,
            5..=6 => Strength::Strong,
            _ => Strength::VeryStrong,
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strength::VeryWeak => "very weak",
            Strength::Weak => "weak",
            Strength::Medium => "medium",
            Strength::Strong => "strong",
            Strength::VeryStrong => "very strong",
        };
        f.write_str(label)
    }
}

/// One line of the rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Criterion {
    pub label: &'static str,
    pub points: u8,
    pub met: bool,
}

/// Result of [`score`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrengthReport {
    pub points: u8,
    pub max_points: u8,
    pub breakdown: Vec<Criterion>,
    pub strength: Strength,
}

/// Score `password` against the rubric.
pub fn score(password: &str) -> StrengthReport {
    let length = password.chars().count();
    let has = |class: CharClass| password.chars().any(|c| CharClass::of(c) == Some(class));

    let breakdown = vec![
        Criterion {
            label: "at least 8 characters",
            points: 1,
            met: length >= 8,
        },
        Criterion {
            label: "at least 12 characters",
            points: 1,
            met: length >= 12,
        },
        Criterion {
            label: "at least 16 characters",
            points: 1,
            met: length >= 16,
        },
        Criterion {
            label: "lowercase letters",
            points: 1,
            met: has(CharClass::Lower),
        },
        Criterion {
            label: "uppercase letters",
            points: 1,
            met: has(CharClass::Upper),
        },
        Criterion {
            label: "digits",
            points: 1,
            met: has(CharClass::Digit),
        },
        Criterion {
            label: "special characters",
            points: 2,
            met: has(CharClass::Special),
        },
        Criterion {
            label: "no ambiguous characters",
            points: 0,
            met: !password.chars().any(|c| AMBIGUOUS.contains(c)),
        },
    ];

    let points = breakdown.iter().filter(|c| c.met).map(|c| c.points).sum();
    StrengthReport {
        points,
        max_points: MAX_POINTS,
        strength: Strength::from_points(points),
        breakdown,
    }
}
