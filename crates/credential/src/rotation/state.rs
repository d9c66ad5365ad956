//! Rotation State Machine
//!
//! Tracks where a single rotation run is.

use serde::{Deserialize, Serialize};

use super::error::RotationError;

/// State of a rotation run
///
/// # State Transitions
///
/// ```text
/// Idle → CheckingDue → Authenticating → GeneratingPassword → Submitting → ConfirmingIfRequired → Recording → Idle
///            ↓   ↓            ↓                 ↓                ↓                 ↓
///          Idle  → → → → → → → → → → → → → → Recording ← ← ← ← ← ← ← ← ← ← (failure at any stage)
/// ```
///
/// `CheckingDue → Idle` is a scheduled run that is not due, or a refusal
/// while the window already holds one; nothing is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    /// No run in progress
    Idle,

    /// Evaluating due-ness and the rate-limit guard
    CheckingDue,

    /// Logging in with a one-time code
    Authenticating,

    /// Producing a password candidate
    GeneratingPassword,

    /// Submitting the new password
    Submitting,

    /// Signing and confirming the change, when the remote asks for it
    ConfirmingIfRequired,

    /// Writing the single history record for the run
    Recording,
}

impl RotationState {
    /// Check if transition to the target state is valid
    #[must_use]
    pub fn can_transition_to(&self, target: RotationState) -> bool {
        use RotationState::{
            Authenticating, CheckingDue, ConfirmingIfRequired, GeneratingPassword, Idle,
            Recording, Submitting,
        };

        match (self, target) {
            // Forward progress
            (Idle, CheckingDue) => true,
            (CheckingDue, Authenticating) => true,
            (Authenticating, GeneratingPassword) => true,
            (GeneratingPassword, Submitting) => true,
            (Submitting, ConfirmingIfRequired) => true,
            (ConfirmingIfRequired, Recording) => true,
            (Recording, Idle) => true,

            // Not due
            (CheckingDue, Idle) => true,

            // Failure from any active state
            (CheckingDue, Recording) => true,
            (Authenticating, Recording) => true,
            (GeneratingPassword, Recording) => true,
            (Submitting, Recording) => true,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Validate and perform state transition
    pub fn transition_to(&self, target: RotationState) -> Result<RotationState, RotationError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(RotationError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if a run is in progress
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, RotationState::Idle)
    }

    /// States after which the new password may already be applied remotely
    #[must_use]
    pub fn is_past_submission(&self) -> bool {
        matches!(
            self,
            RotationState::Submitting | RotationState::ConfirmingIfRequired
        )
    }
}

impl std::fmt::Display for RotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationState::Idle => write!(f, "idle"),
            RotationState::CheckingDue => write!(f, "checking_due"),
            RotationState::Authenticating => write!(f, "authenticating"),
            RotationState::GeneratingPassword => write!(f, "generating_password"),
            RotationState::Submitting => write!(f, "submitting"),
            RotationState::ConfirmingIfRequired => write!(f, "confirming_if_required"),
            RotationState::Recording => write!(f, "recording"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RotationState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Idle,
            CheckingDue,
            Authenticating,
            GeneratingPassword,
            Submitting,
            ConfirmingIfRequired,
            Recording,
            Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Idle.can_transition_to(Submitting));
        assert!(!Submitting.can_transition_to(Authenticating));
        assert!(!Recording.can_transition_to(Recording));
        assert!(!Idle.can_transition_to(Recording));
        assert!(matches!(
            Authenticating.transition_to(Idle),
            Err(RotationError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_failure_paths_reach_recording() {
        for state in [CheckingDue, Authenticating, GeneratingPassword, Submitting] {
            assert_eq!(state.transition_to(Recording).unwrap(), Recording);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ConfirmingIfRequired.to_string(), "confirming_if_required");
    }
}
