//! Session, message and turn data for the conversational core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use smartgov_core::{Category, Language, Role};

/// Title shown for sessions the backend has not named.
pub const UNTITLED: &str = "Untitled";

// =============================================================================
// Session log
// =============================================================================

/// One entry of a session log.
///
/// `id` is local display keying only. It never reaches the backend and never
/// decides order; position in the log does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A conversation thread. The id is assigned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Session {
    /// Title for display, `"Untitled"` when unset.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNTITLED)
    }

    /// Number of completed turns.
    pub fn turn_count(&self) -> usize {
        self.messages.len() / 2
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        let messages = record
            .messages
            .into_iter()
            .filter_map(|m| {
                let role = match m.role.as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    other => {
                        tracing::debug!(role = other, "Skipping non-conversational message");
                        return None;
                    }
                };
                Some(Message {
                    id: Uuid::new_v4(),
                    role,
                    text: m.message,
                    created_at: m.timestamp.unwrap_or(record.created_at),
                })
            })
            .collect();

        Self {
            id: record.id,
            title: record.title,
            created_at: record.created_at,
            messages,
        }
    }
}

// =============================================================================
// Backend records
// =============================================================================

/// Session as returned by the backend on creation or listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

/// Stored message inside a `SessionRecord`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    pub role: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accept a JSON string or number as an opaque identifier.
pub(crate) fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

pub(crate) fn opaque_id_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "opaque_id")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(id)| id))
}

// =============================================================================
// Turns
// =============================================================================

/// Context captured at the moment of send and passed unchanged through the
/// transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    pub session_id: String,
    pub language: Language,
    pub category: Category,
}

/// Successful backend answer for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    /// Interaction log id, used to rate the reply later.
    pub log_id: Option<String>,
}

/// Result of a send request on the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// A turn was already in flight; nothing happened.
    Ignored,
    /// The turn settled and both messages were appended.
    Delivered {
        session_id: String,
        user: Message,
        assistant: Message,
        log_id: Option<String>,
    },
}

/// Result of a voice capture on the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// The transcript is now the draft.
    Transcribed(String),
    /// The session changed or a send started while listening; the
    /// transcript was dropped.
    Discarded,
}
