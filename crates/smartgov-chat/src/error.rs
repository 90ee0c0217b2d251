//! Error taxonomy for the conversational core.

use smartgov_core::FailureKind;

use crate::state::TurnState;

/// Errors from the session store, transport, speech bridge and controller.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("backend rejected the request{}: {message}", status_suffix(.status))]
    BackendRejected {
        status: Option<u16>,
        message: String,
    },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("voice capture failed: {0}")]
    ListenFailed(String),
    #[error("voice capture is already active")]
    AlreadyListening,
    #[error("voice capture is not available on this platform")]
    SpeechUnavailable,
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("no session is selected")]
    NoCurrentSession,
    #[error("invalid turn state transition: {from} -> {to}")]
    InvalidTransition { from: TurnState, to: TurnState },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl ChatError {
    /// Failure class for event consumers.
    pub fn kind(&self) -> FailureKind {
        match self {
            ChatError::InvalidInput(_) => FailureKind::InvalidInput,
            ChatError::NetworkFailure(_) => FailureKind::NetworkFailure,
            ChatError::BackendRejected { .. } => FailureKind::BackendRejected,
            ChatError::BackendUnavailable(_) => FailureKind::BackendUnavailable,
            ChatError::ListenFailed(_) => FailureKind::ListenFailed,
            ChatError::AlreadyListening => FailureKind::AlreadyListening,
            ChatError::SpeechUnavailable => FailureKind::SpeechUnavailable,
            ChatError::NotFound(_) => FailureKind::NotFound,
            ChatError::NoCurrentSession => FailureKind::NoCurrentSession,
            ChatError::InvalidTransition { .. } => FailureKind::InvalidTransition,
        }
    }

    /// Whether resending the same turn could succeed. Nothing retries
    /// automatically; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::NetworkFailure(_))
    }
}
