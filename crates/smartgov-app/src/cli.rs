//! CLI argument definitions for the SmartGov terminal client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use smartgov_core::{Category, Credential, Language, Result};

/// SmartGov: ask about government schemes from the terminal.
#[derive(Parser, Debug)]
#[command(name = "smartgov", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the advisory backend.
    #[arg(short = 'b', long = "backend-url")]
    pub backend_url: Option<String>,

    /// API token for the backend.
    #[arg(short = 't', long = "token")]
    pub token: Option<String>,

    /// Reply language (en, hi).
    #[arg(long = "language")]
    pub language: Option<String>,

    /// Scheme category tag.
    #[arg(long = "category")]
    pub category: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Disable voice input and spoken replies.
    #[arg(long = "no-speech")]
    pub no_speech: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SMARTGOV_CONFIG env var > platform default (~/.smartgov/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SMARTGOV_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the backend base URL.
    ///
    /// Priority: --backend-url flag > SMARTGOV_BACKEND_URL env var > config file value.
    pub fn resolve_backend_url(&self, config_url: &str) -> String {
        if let Some(ref url) = self.backend_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("SMARTGOV_BACKEND_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config_url.to_string()
    }

    /// Resolve the API credential.
    ///
    /// Priority: --token flag > SMARTGOV_TOKEN env var. The token is never
    /// read from the config file.
    pub fn resolve_token(&self) -> Option<Credential> {
        self.token
            .clone()
            .or_else(|| std::env::var("SMARTGOV_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
            .map(Credential::new)
    }

    /// Resolve the starting language, falling back to the config default.
    pub fn resolve_language(&self, config_language: Language) -> Result<Language> {
        match self.language {
            Some(ref code) => code.parse(),
            None => Ok(config_language),
        }
    }

    /// Resolve the starting category, falling back to the config default.
    pub fn resolve_category(&self, config_category: &Category) -> Result<Category> {
        match self.category {
            Some(ref tag) => tag.parse(),
            None => Ok(config_category.clone()),
        }
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".smartgov").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".smartgov").join("config.toml");
    }
    PathBuf::from("config.toml")
}
