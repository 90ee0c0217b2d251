//! Speech bridge: capability-checked, language-aware access to platform
//! speech-to-text and text-to-speech.
//!
//! The platform's result/error callbacks are folded into a single awaited
//! outcome per capture: a transcript or a `ListenFailed` error, never both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use smartgov_core::config::SpeechConfig;
use smartgov_core::Language;

use crate::error::ChatError;

/// Failure reported by a platform speech service.
#[derive(Debug, thiserror::Error)]
pub enum SpeechPlatformError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no speech detected")]
    NoSpeech,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("speech output failed: {0}")]
    Playback(String),
}

/// Platform speech services, treated as opaque capabilities.
#[async_trait]
pub trait SpeechPlatform: Send + Sync {
    /// Whether this platform can capture and synthesize speech at all.
    fn is_supported(&self) -> bool;

    /// Capture a single utterance in `locale` and return its transcript.
    ///
    /// Timeout policy belongs to the platform; the future must resolve.
    async fn recognize_once(&self, locale: &str) -> Result<String, SpeechPlatformError>;

    /// Queue `text` for playback in `locale`. Ordering between overlapping
    /// requests is up to the platform.
    fn speak(&self, text: &str, locale: &str) -> Result<(), SpeechPlatformError>;
}

/// Platform with no speech support, used by terminal front ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeechPlatform;

#[async_trait]
impl SpeechPlatform for NoSpeechPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    async fn recognize_once(&self, _locale: &str) -> Result<String, SpeechPlatformError> {
        Err(SpeechPlatformError::Device(
            "speech capture is not supported".to_string(),
        ))
    }

    fn speak(&self, _text: &str, _locale: &str) -> Result<(), SpeechPlatformError> {
        Err(SpeechPlatformError::Playback(
            "speech output is not supported".to_string(),
        ))
    }
}

/// Clears the listening flag when the capture ends, however it ends.
struct ListeningGuard<'a>(&'a AtomicBool);

impl Drop for ListeningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wraps a `SpeechPlatform` with capability checks, locale selection and a
/// single-capture guard.
#[derive(Clone)]
pub struct SpeechBridge {
    platform: Arc<dyn SpeechPlatform>,
    config: SpeechConfig,
    listening: Arc<AtomicBool>,
}

impl SpeechBridge {
    pub fn new(platform: Arc<dyn SpeechPlatform>, config: SpeechConfig) -> Self {
        Self {
            platform,
            config,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bridge with no capability at all.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(NoSpeechPlatform), SpeechConfig::default())
    }

    /// Capability probe. Voice controls should be disabled when false.
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.platform.is_supported()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Platform locale for `language`.
    pub fn locale_for(&self, language: Language) -> &str {
        self.config.locale_for(language)
    }

    /// Capture one utterance.
    ///
    /// Fails with `AlreadyListening` if a capture is in progress, and with
    /// `ListenFailed` on permission denial, silence or device errors. The
    /// listening flag is released on every exit path, including when the
    /// returned future is dropped.
    pub async fn start_listening(&self, language: Language) -> Result<String, ChatError> {
        if !self.is_available() {
            return Err(ChatError::SpeechUnavailable);
        }
        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ChatError::AlreadyListening);
        }
        let _guard = ListeningGuard(&self.listening);

        let locale = self.locale_for(language).to_string();
        tracing::debug!(locale = %locale, "Voice capture started");

        match self.platform.recognize_once(&locale).await {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                tracing::debug!(text_len = text.len(), "Voice capture produced transcript");
                Ok(text)
            }
            Ok(_) => Err(ChatError::ListenFailed(
                SpeechPlatformError::NoSpeech.to_string(),
            )),
            Err(e) => {
                tracing::debug!(error = %e, "Voice capture failed");
                Err(ChatError::ListenFailed(e.to_string()))
            }
        }
    }

    /// Fire-and-forget playback. Returns whether the text was handed to the
    /// platform; playback failures are logged and otherwise ignored.
    pub fn speak(&self, text: &str, language: Language) -> bool {
        if !self.is_available() || text.trim().is_empty() {
            return false;
        }
        match self.platform.speak(text, self.locale_for(language)) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Speech output skipped");
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
