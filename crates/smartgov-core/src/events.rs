use serde::{Deserialize, Serialize};

use crate::types::{FailureKind, Language};

/// Events published by the turn controller.
///
/// Consumed by display collaborators (session sidebar, message pane, voice
/// indicator). Events carry ids and sizes, never message bodies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ChatEvent {
    // =========================================================================
    // Session Events
    // =========================================================================
    /// The session list was fetched from the backend.
    SessionsLoaded { count: usize },

    /// A new session was allocated and made current.
    SessionCreated { session_id: String },

    /// The current session changed.
    SessionSelected { session_id: String },

    // =========================================================================
    // Turn Events
    // =========================================================================
    /// A turn left the controller for the backend.
    TurnStarted {
        session_id: String,
        language: Language,
        category: String,
        text_length: usize,
    },

    /// A turn completed and its message pair was appended.
    TurnSettled {
        session_id: String,
        log_id: Option<String>,
        reply_length: usize,
    },

    /// A turn failed; history is untouched.
    TurnFailed {
        session_id: String,
        kind: FailureKind,
        message: String,
    },

    /// The assistant reply was handed to text-to-speech.
    ReplySpoken { session_id: String },

    // =========================================================================
    // Voice Events
    // =========================================================================
    /// Single-utterance capture began.
    ListenStarted { language: Language },

    /// A transcript was placed in the draft.
    TranscriptReady { text_length: usize },

    /// A transcript arrived after its session stopped being current.
    TranscriptDiscarded { text_length: usize },

    /// Capture ended without a transcript.
    ListenFailed { reason: String },
}
