use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SmartGovError};
use crate::types::{Category, Language};

/// Top-level configuration for the SmartGov conversational front end.
///
/// Loaded from `~/.smartgov/config.toml` by default. Each section is optional
/// and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartGovConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl SmartGovConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SmartGovConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SmartGovError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Advisory backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Whole-request timeout. Expiry is reported as a network failure.
    pub request_timeout_secs: u64,
    /// Scheme word placed before the credential in the `Authorization` header.
    pub auth_scheme: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 30,
            auth_scheme: "Token".to_string(),
        }
    }
}

/// Turn controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Language selected when the controller starts.
    pub default_language: Language,
    /// Category selected when the controller starts.
    pub default_category: Category,
    /// Read assistant replies aloud when speech output is available.
    pub speak_replies: bool,
    /// Longest draft, in characters, accepted for sending.
    pub max_message_chars: usize,
    /// Length of the title derived from the first user message.
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_language: Language::English,
            default_category: Category::General,
            speak_replies: true,
            max_message_chars: 2000,
            title_max_chars: 50,
        }
    }
}

/// Speech bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Master switch; when false the bridge reports no capability.
    pub enabled: bool,
    /// Locale for every language without a dedicated entry.
    pub default_locale: String,
    /// Locale used for Hindi capture and playback.
    pub hindi_locale: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_locale: "en-US".to_string(),
            hindi_locale: "hi-IN".to_string(),
        }
    }
}

impl SpeechConfig {
    /// Platform locale for a conversation language.
    pub fn locale_for(&self, language: Language) -> &str {
        match language {
            Language::Hindi => &self.hindi_locale,
            _ => &self.default_locale,
        }
    }
}
