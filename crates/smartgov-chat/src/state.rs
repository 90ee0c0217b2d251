//! Turn state machine.
//!
//! Enforces valid transitions for one controller's turn lifecycle:
//! - Idle -> Composing (keystroke or transcript)
//! - Composing -> Sending (explicit send)
//! - Sending -> Idle (reply received)
//! - Sending -> Speaking (reply received and handed to text-to-speech)
//! - Sending -> Composing (send failed, draft kept)
//! - Composing -> Idle (session switch discards the draft)
//! - Speaking -> Composing (new input while the reply is read aloud)
//! - Speaking -> Idle (playback finished or session switch)
//!
//! `Speaking` behaves like `Idle` for input purposes.

use std::fmt;

use crate::error::ChatError;

/// Lifecycle state of the turn controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Nothing drafted, nothing in flight.
    Idle,
    /// Draft text held locally, not yet committed.
    Composing,
    /// Request in flight; input is locked.
    Sending,
    /// The last reply is being read aloud. Idle otherwise.
    Speaking,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::Composing => write!(f, "Composing"),
            TurnState::Sending => write!(f, "Sending"),
            TurnState::Speaking => write!(f, "Speaking"),
        }
    }
}

impl TurnState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &TurnState) -> bool {
        matches!(
            (self, target),
            (TurnState::Idle, TurnState::Composing)
                | (TurnState::Composing, TurnState::Sending)
                | (TurnState::Sending, TurnState::Idle)
                | (TurnState::Sending, TurnState::Speaking)
                | (TurnState::Sending, TurnState::Composing)
                | (TurnState::Composing, TurnState::Idle)
                | (TurnState::Speaking, TurnState::Composing)
                | (TurnState::Speaking, TurnState::Idle)
        )
    }

    /// True for states that accept new input.
    pub fn is_idle(&self) -> bool {
        matches!(self, TurnState::Idle | TurnState::Speaking)
    }
}

/// Validating holder for a `TurnState`.
///
/// Owned by the controller behind its own lock, so it carries no
/// synchronization of its own.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: TurnState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> TurnState {
        self.state
    }

    /// Attempt to transition to the target state.
    ///
    /// Returns `ChatError::InvalidTransition` and leaves the state unchanged
    /// if the transition is not allowed from the current state.
    pub fn transition(&mut self, target: TurnState) -> Result<(), ChatError> {
        if self.state.can_transition_to(&target) {
            tracing::debug!("Turn state: {} -> {}", self.state, target);
            self.state = target;
            Ok(())
        } else {
            Err(ChatError::InvalidTransition {
                from: self.state,
                to: target,
            })
        }
    }

    /// Move to `target` unless already there.
    pub fn ensure(&mut self, target: TurnState) -> Result<(), ChatError> {
        if self.state == target {
            return Ok(());
        }
        self.transition(target)
    }
}

// =============================================================================
// Tests
// =============================================================================
