use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SmartGovError;

// =============================================================================
// Enums
// =============================================================================

/// Conversation language sent with every turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// English (`en`).
    #[default]
    #[serde(rename = "en")]
    English,
    /// Hindi (`hi`).
    #[serde(rename = "hi")]
    Hindi,
}

impl Language {
    /// Wire code used by the advisory backend.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = SmartGovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::English),
            "hi" => Ok(Language::Hindi),
            other => Err(SmartGovError::Config(format!("unknown language: {other}"))),
        }
    }
}

/// Advisory category tag attached to a turn.
///
/// Serialized as its plain tag string. Unknown tags are kept verbatim in
/// `Custom` so new backend categories need no client release.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Category {
    #[default]
    General,
    SchemeInfo,
    Eligibility,
    Documents,
    Custom(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::General => "general",
            Category::SchemeInfo => "scheme_info",
            Category::Eligibility => "eligibility",
            Category::Documents => "documents",
            Category::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SmartGovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Ok(match tag {
            "" => return Err(SmartGovError::Config("category tag is empty".to_string())),
            "general" => Category::General,
            "scheme_info" => Category::SchemeInfo,
            "eligibility" => Category::Eligibility,
            "documents" => Category::Documents,
            other => Category::Custom(other.to_string()),
        })
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Author of a message in a session log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Failure class surfaced to display collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    NetworkFailure,
    BackendRejected,
    BackendUnavailable,
    ListenFailed,
    AlreadyListening,
    SpeechUnavailable,
    NotFound,
    NoCurrentSession,
    InvalidTransition,
}

// =============================================================================
// Newtypes
// =============================================================================

/// Already-valid account credential issued by the account service.
///
/// The value is never printed; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}
