//! Password configuration and candidate generation

use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use super::strength::{StrengthReport, score};
use crate::core::SecretString;

/// Shortest password the policy will produce.
pub const MIN_LENGTH: usize = 8;
/// Longest password the policy will produce.
pub const MAX_LENGTH: usize = 128;

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Glyphs that are easy to misread.
pub const AMBIGUOUS: &str = "0O1lI";

/// Policy validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Every character class is disabled
    #[error("at least one character class must be enabled")]
    NoCharacterClasses,

    /// Requested length is below the minimum
    #[error("password length {length} is below the minimum of {min}")]
    TooShort { length: usize, min: usize },

    /// Requested length is above the maximum
    #[error("password length {length} is above the maximum of {max}")]
    TooLong { length: usize, max: usize },
}

/// A character class a password may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    Lower,
    Upper,
    Digit,
    Special,
}

impl CharClass {
    /// All classes in alphabet order.
    pub const ALL: [CharClass; 4] = [
        CharClass::Lower,
        CharClass::Upper,
        CharClass::Digit,
        CharClass::Special,
    ];

    /// Full alphabet for this class.
    pub fn alphabet(self) -> &'static str {
        match self {
            CharClass::Lower => LOWER,
            CharClass::Upper => UPPER,
            CharClass::Digit => DIGITS,
            CharClass::Special => SPECIAL,
        }
    }

    /// Class of `c`, if it belongs to one.
    pub fn of(c: char) -> Option<CharClass> {
        Self::ALL
            .into_iter()
            .find(|class| class.alphabet().contains(c))
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharClass::Lower => write!(f, "lowercase"),
            CharClass::Upper => write!(f, "uppercase"),
            CharClass::Digit => write!(f, "digits"),
            CharClass::Special => write!(f, "special"),
        }
    }
}

/// Shape of generated passwords
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Total length in characters
    #[serde(alias = "password_length")]
    pub length: usize,

    /// Include `A-Z`
    #[serde(alias = "use_uppercase")]
    pub use_upper: bool,

    /// Include `a-z`
    #[serde(alias = "use_lowercase")]
    pub use_lower: bool,

    /// Include `0-9`
    #[serde(alias = "use_numbers")]
    pub use_digits: bool,

    /// Include punctuation
    #[serde(alias = "use_special_chars")]
    pub use_special: bool,

    /// Drop `0 O 1 l I` from every alphabet
    pub exclude_ambiguous: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            length: 16,
            use_upper: true,
            use_lower: true,
            use_digits: true,
            use_special: true,
            exclude_ambiguous: true,
        }
    }
}

impl PasswordConfig {
    /// Enabled classes in alphabet order.
    pub fn classes(&self) -> Vec<CharClass> {
        CharClass::ALL
            .into_iter()
            .filter(|class| match class {
                CharClass::Lower => self.use_lower,
                CharClass::Upper => self.use_upper,
                CharClass::Digit => self.use_digits,
                CharClass::Special => self.use_special,
            })
            .collect()
    }

    /// Alphabet for `class` with ambiguous glyphs removed when configured.
    pub fn alphabet(&self, class: CharClass) -> Vec<char> {
        class
            .alphabet()
            .chars()
            .filter(|c| !(self.exclude_ambiguous && AMBIGUOUS.contains(*c)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.classes().is_empty() {
            return Err(PolicyError::NoCharacterClasses);
        }
        if self.length < MIN_LENGTH {
            return Err(PolicyError::TooShort {
                length: self.length,
                min: MIN_LENGTH,
            });
        }
        if self.length > MAX_LENGTH {
            return Err(PolicyError::TooLong {
                length: self.length,
                max: MAX_LENGTH,
            });
        }
        Ok(())
    }
}

/// A freshly generated password and what it is made of.
///
/// Dropping the candidate zeroizes the plaintext.
#[derive(Debug, Clone)]
pub struct PasswordCandidate {
    plaintext: SecretString,
    classes: Vec<CharClass>,
    strength: StrengthReport,
}

impl PasswordCandidate {
    /// Wrap an existing secret, deriving its classes and score.
    pub fn from_secret(plaintext: SecretString) -> Self {
        let (classes, strength) = plaintext.expose_secret(|text| {
            let classes = CharClass::ALL
                .into_iter()
                .filter(|class| text.chars().any(|c| CharClass::of(c) == Some(*class)))
                .collect::<Vec<_>>();
            (classes, score(text))
        });
        Self {
            plaintext,
            classes,
            strength,
        }
    }

    pub fn secret(&self) -> &SecretString {
        &self.plaintext
    }

    pub fn into_secret(self) -> SecretString {
        self.plaintext
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.plaintext.expose_secret(|text| text.chars().count())
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext.is_empty()
    }

    /// Classes that actually occur in the password.
    pub fn classes(&self) -> &[CharClass] {
        &self.classes
    }

    pub fn strength(&self) -> &StrengthReport {
        &self.strength
    }
}

/// Generate a password for `config` using the thread CSPRNG.
///
/// One character is drawn from each enabled class, the rest from the union of
/// enabled alphabets, and the whole buffer is then shuffled. `config` must
/// already be valid.
pub fn generate(config: &PasswordConfig) -> PasswordCandidate {
    let mut rng = rand::rng();
    let classes = config.classes();
    let alphabets: Vec<Vec<char>> = classes.iter().map(|c| config.alphabet(*c)).collect();
    let pool: Vec<char> = alphabets.iter().flatten().copied().collect();

    let mut buffer: Zeroizing<Vec<char>> = Zeroizing::new(Vec::with_capacity(config.length));
    for alphabet in &alphabets {
        if let Some(c) = alphabet.choose(&mut rng) {
            buffer.push(*c);
        }
    }
    while buffer.len() < config.length {
        match pool.choose(&mut rng) {
            Some(c) => buffer.push(*c),
            None => break,
        }
    }
    buffer.shuffle(&mut rng);

    let plaintext = SecretString::new(buffer.iter().collect::<String>());
    PasswordCandidate::from_secret(plaintext)
}

/// Source of new password candidates.
pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> PasswordCandidate;
}

/// A validated [`PasswordConfig`].
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    config: PasswordConfig,
}

impl PasswordPolicy {
    pub fn new(config: PasswordConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }
}

impl PasswordGenerator for PasswordPolicy {
    fn generate(&self) -> PasswordCandidate {
        generate(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(PasswordConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_no_classes_rejected() {
        let config = PasswordConfig {
            use_upper: false,
            use_lower: false,
            use_digits: false,
            use_special: false,
            ..PasswordConfig::default()
        };
        assert_eq!(config.validate(), Err(PolicyError::NoCharacterClasses));
    }

    #[test]
    fn test_length_bounds() {
        let short = PasswordConfig {
            length: 7,
            ..PasswordConfig::default()
        };
        assert_eq!(
            short.validate(),
            Err(PolicyError::TooShort { length: 7, min: 8 })
        );
        let long = PasswordConfig {
            length: 129,
            ..PasswordConfig::default()
        };
        assert!(matches!(long.validate(), Err(PolicyError::TooLong { .. })));
    }

    #[test]
    fn test_generate_covers_every_enabled_class() {
        let config = PasswordConfig {
            length: 8,
            ..PasswordConfig::default()
        };
        for _ in 0..200 {
            let candidate = generate(&config);
            assert_eq!(candidate.len(), 8);
            assert_eq!(candidate.classes(), CharClass::ALL.as_slice());
        }
    }

    #[test]
    fn test_generate_digits_only_without_ambiguous() {
        let config = PasswordConfig {
            length: 64,
            use_upper: false,
            use_lower: false,
            use_special: false,
            ..PasswordConfig::default()
        };
        let candidate = generate(&config);
        candidate.secret().expose_secret(|text| {
            assert!(text.chars().all(|c| c.is_ascii_digit()));
            assert!(!text.contains('0') && !text.contains('1'));
        });
    }

    #[test]
    fn test_legacy_field_aliases() {
        let config: PasswordConfig =
            serde_json::from_str(r#"{"password_length": 24, "use_special_chars": false}"#).unwrap();
        assert_eq!(config.length, 24);
        assert!(!config.use_special);
        assert!(config.use_digits);
    }

    #[test]
    fn test_policy_rejects_invalid_config() {
        let err = PasswordPolicy::new(PasswordConfig {
            length: 4,
            ..PasswordConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, PolicyError::TooShort { .. }));
    }
}
