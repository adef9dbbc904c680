//! Listener state machine with validated transitions.
//!
//! One enumerated state replaces the overlapping `in_utterance` /
//! `in_command` flags a naive port would carry:
//! - Idle -> Listening (speech detected)
//! - Listening -> Idle (utterance closed, no wake phrase / command reported)
//! - Listening -> AwaitingCommand (wake phrase matched, command window open)
//! - AwaitingCommand -> Listening (command speech started)
//! - AwaitingCommand -> Idle (command window timed out)
//!
//! "Speech during the command window" is `Listening` with the grammar search
//! active; the search mode lives on the decoder, not here.

use std::fmt;

use hark_core::error::{HarkError, Result};

/// Operational state of the command listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ListenerState {
    /// Passively waiting for speech. The keyword search is active.
    #[default]
    Idle,
    /// An utterance has seen speech and is still open.
    Listening,
    /// Wake phrase matched; silently waiting for a command utterance to
    /// start before the window deadline.
    AwaitingCommand,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Idle => write!(f, "Idle"),
            ListenerState::Listening => write!(f, "Listening"),
            ListenerState::AwaitingCommand => write!(f, "AwaitingCommand"),
        }
    }
}

impl ListenerState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &ListenerState) -> bool {
        matches!(
            (self, target),
            (ListenerState::Idle, ListenerState::Listening)
                | (ListenerState::Listening, ListenerState::Idle)
                | (ListenerState::Listening, ListenerState::AwaitingCommand)
                | (ListenerState::AwaitingCommand, ListenerState::Listening)
                | (ListenerState::AwaitingCommand, ListenerState::Idle)
        )
    }
}

/// State holder for the session loop.
///
/// The session state is owned by exactly one task, so no locking is needed;
/// transitions are still validated to catch logic errors early.
#[derive(Debug, Default)]
pub struct StateTracker {
    state: ListenerState,
}

impl StateTracker {
    /// Create a new tracker initialized to `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn current(&self) -> ListenerState {
        self.state
    }

    /// Attempt to transition to the target state.
    ///
    /// Returns `HarkError::Session` if the transition is not allowed from
    /// the current state.
    pub fn transition(&mut self, target: ListenerState) -> Result<()> {
        if self.state.can_transition_to(&target) {
            tracing::debug!("Listener state: {} -> {}", self.state, target);
            self.state = target;
            Ok(())
        } else {
            Err(HarkError::Session(format!(
                "Invalid state transition: {} -> {}",
                self.state, target
            )))
        }
    }

    /// Force the tracker back to Idle (used on the fatal-error exit path).
    pub fn reset(&mut self) {
        if self.state != ListenerState::Idle {
            tracing::warn!("Listener state reset to Idle from {}", self.state);
        }
        self.state = ListenerState::Idle;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ListenerState::Idle.to_string(), "Idle");
        assert_eq!(ListenerState::Listening.to_string(), "Listening");
        assert_eq!(ListenerState::AwaitingCommand.to_string(), "AwaitingCommand");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(ListenerState::Idle.can_transition_to(&ListenerState::Listening));
        assert!(ListenerState::Listening.can_transition_to(&ListenerState::Idle));
        assert!(ListenerState::Listening.can_transition_to(&ListenerState::AwaitingCommand));
        assert!(ListenerState::AwaitingCommand.can_transition_to(&ListenerState::Listening));
        assert!(ListenerState::AwaitingCommand.can_transition_to(&ListenerState::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        // Idle can only start listening.
        assert!(!ListenerState::Idle.can_transition_to(&ListenerState::AwaitingCommand));

        // No transitions to self.
        assert!(!ListenerState::Idle.can_transition_to(&ListenerState::Idle));
        assert!(!ListenerState::Listening.can_transition_to(&ListenerState::Listening));
        assert!(
            !ListenerState::AwaitingCommand.can_transition_to(&ListenerState::AwaitingCommand)
        );
    }

    #[test]
    fn test_tracker_keyword_cycle() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.current(), ListenerState::Idle);

        tracker.transition(ListenerState::Listening).unwrap();
        tracker.transition(ListenerState::AwaitingCommand).unwrap();
        tracker.transition(ListenerState::Listening).unwrap();
        tracker.transition(ListenerState::Idle).unwrap();
        assert_eq!(tracker.current(), ListenerState::Idle);
    }

    #[test]
    fn test_tracker_timeout_path() {
        let mut tracker = StateTracker::new();
        tracker.transition(ListenerState::Listening).unwrap();
        tracker.transition(ListenerState::AwaitingCommand).unwrap();
        tracker.transition(ListenerState::Idle).unwrap();
        assert_eq!(tracker.current(), ListenerState::Idle);
    }

    #[test]
    fn test_tracker_invalid_transition() {
        let mut tracker = StateTracker::new();
        let result = tracker.transition(ListenerState::AwaitingCommand);
        assert!(result.is_err());
        assert_eq!(tracker.current(), ListenerState::Idle);
    }

    #[test]
    fn test_tracker_transition_error_message() {
        let mut tracker = StateTracker::new();
        match tracker.transition(ListenerState::AwaitingCommand) {
            Err(HarkError::Session(msg)) => {
                assert!(msg.contains("Idle"));
                assert!(msg.contains("AwaitingCommand"));
            }
            _ => panic!("Expected Session error variant"),
        }
    }

    #[test]
    fn test_tracker_reset() {
        let mut tracker = StateTracker::new();
        tracker.transition(ListenerState::Listening).unwrap();
        tracker.reset();
        assert_eq!(tracker.current(), ListenerState::Idle);
    }
}
