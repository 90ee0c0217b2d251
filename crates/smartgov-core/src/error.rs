use thiserror::Error;

/// Top-level error type for the SmartGov front end.
///
/// Covers the cross-cutting failures (configuration, file I/O,
/// serialization). The conversational core has its own `ChatError`
/// taxonomy in `smartgov-chat`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmartGovError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SmartGovError {
    fn from(err: toml::de::Error) -> Self {
        SmartGovError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SmartGovError {
    fn from(err: toml::ser::Error) -> Self {
        SmartGovError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SmartGovError {
    fn from(err: serde_json::Error) -> Self {
        SmartGovError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for SmartGov operations.
pub type Result<T> = std::result::Result<T, SmartGovError>;
