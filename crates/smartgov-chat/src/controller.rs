//! Turn controller: the orchestration state machine between user input,
//! the message transport, the session store and the speech bridge.
//!
//! At most one turn is in flight per controller. A send attempted while
//! another is in flight returns `SendOutcome::Ignored` without side effects,
//! so message pairs land in a session in send order. A failed turn leaves
//! history untouched and keeps the draft for a retry.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use smartgov_core::config::ChatConfig;
use smartgov_core::{Category, ChatEvent, Language};

use crate::error::ChatError;
use crate::speech::SpeechBridge;
use crate::state::{StateMachine, TurnState};
use crate::store::SessionStore;
use crate::transport::{validate_turn_text, MessageTransport};
use crate::types::{ListenOutcome, SendOutcome, Session, TurnContext, TurnReply};

/// Capacity of the event channel. Slow subscribers lose the oldest events.
const EVENT_CAPACITY: usize = 64;

struct ControllerInner {
    machine: StateMachine,
    draft: String,
    language: Language,
    category: Category,
    /// Bumped on every session change; in-flight work compares against it.
    selection_epoch: u64,
    last_log_id: Option<String>,
}

/// Drives turns for one conversation surface.
pub struct TurnController {
    store: Arc<SessionStore>,
    transport: Arc<dyn MessageTransport>,
    speech: SpeechBridge,
    config: ChatConfig,
    inner: Mutex<ControllerInner>,
    events: broadcast::Sender<ChatEvent>,
}

/// Rolls the controller out of `Sending` if a send future is dropped before
/// it settles.
struct InFlight<'a> {
    controller: &'a TurnController,
    epoch: u64,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("Turn abandoned before settling");
            self.controller.release_after_failure(self.epoch);
        }
    }
}

impl TurnController {
    /// Create a controller in `Idle` with the configured default language
    /// and category.
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn MessageTransport>,
        speech: SpeechBridge,
        config: ChatConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = ControllerInner {
            machine: StateMachine::new(),
            draft: String::new(),
            language: config.default_language,
            category: config.default_category.clone(),
            selection_epoch: 0,
            last_log_id: None,
        };

        Self {
            store,
            transport,
            speech,
            config,
            inner: Mutex::new(inner),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -- Accessors --

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn state(&self) -> TurnState {
        self.lock().machine.current()
    }

    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    pub fn set_language(&self, language: Language) {
        self.lock().language = language;
    }

    pub fn category(&self) -> Category {
        self.lock().category.clone()
    }

    pub fn set_category(&self, category: Category) {
        self.lock().category = category;
    }

    /// Log id of the most recent reply that carried one.
    pub fn last_log_id(&self) -> Option<String> {
        self.lock().last_log_id.clone()
    }

    /// Whether voice controls should be enabled.
    pub fn voice_available(&self) -> bool {
        self.speech.is_available()
    }

    pub fn is_listening(&self) -> bool {
        self.speech.is_listening()
    }

    // -- Input --

    /// Replace the draft with `text` (a keystroke's worth of editing).
    ///
    /// Returns `Ok(false)` without touching the draft while a turn is in
    /// flight.
    pub fn set_draft(&self, text: impl Into<String>) -> Result<bool, ChatError> {
        let mut inner = self.lock();
        if inner.machine.current() == TurnState::Sending {
            tracing::debug!("Draft edit rejected while sending");
            return Ok(false);
        }
        inner.draft = text.into();
        inner.machine.ensure(TurnState::Composing)?;
        Ok(true)
    }

    /// Send the draft as one turn on the current session.
    ///
    /// On success both messages are appended, the draft is cleared and the
    /// reply is optionally read aloud. On failure the draft is kept and the
    /// controller returns to `Composing`.
    pub async fn send(&self) -> Result<SendOutcome, ChatError> {
        let (context, text, epoch) = {
            let mut inner = self.lock();
            if inner.machine.current() == TurnState::Sending {
                tracing::debug!("Send ignored, a turn is already in flight");
                return Ok(SendOutcome::Ignored);
            }

            validate_turn_text(&inner.draft)?;
            let text = inner.draft.clone();
            if text.chars().count() > self.config.max_message_chars {
                return Err(ChatError::InvalidInput(format!(
                    "message exceeds maximum length of {} characters",
                    self.config.max_message_chars
                )));
            }
            let session_id = self.store.current_id().ok_or(ChatError::NoCurrentSession)?;

            inner.machine.ensure(TurnState::Composing)?;
            inner.machine.transition(TurnState::Sending)?;

            let context = TurnContext {
                session_id,
                language: inner.language,
                category: inner.category.clone(),
            };
            (context, text, inner.selection_epoch)
        };

        tracing::info!(
            session_id = %context.session_id,
            language = %context.language,
            category = %context.category,
            "Turn started"
        );
        self.publish(ChatEvent::TurnStarted {
            session_id: context.session_id.clone(),
            language: context.language,
            category: context.category.to_string(),
            text_length: text.chars().count(),
        });

        let in_flight = InFlight {
            controller: self,
            epoch,
            armed: true,
        };
        let result = self.transport.send_turn(&context, &text).await;
        in_flight.disarm();

        match result {
            Ok(reply) => self.settle_success(context, &text, reply, epoch),
            Err(e) => Err(self.settle_failure(&context, epoch, e)),
        }
    }

    fn settle_success(
        &self,
        context: TurnContext,
        text: &str,
        reply: TurnReply,
        epoch: u64,
    ) -> Result<SendOutcome, ChatError> {
        let (user, assistant) = match self
            .store
            .append_turn(&context.session_id, text, &reply.text)
        {
            Ok(pair) => pair,
            Err(e) => return Err(self.settle_failure(&context, epoch, e)),
        };

        let still_current =
            self.store.current_id().as_deref() == Some(context.session_id.as_str());
        let spoken = still_current
            && self.config.speak_replies
            && self.speech.speak(&reply.text, context.language);

        {
            let mut inner = self.lock();
            inner.draft.clear();
            if reply.log_id.is_some() {
                inner.last_log_id = reply.log_id.clone();
            }
            let next = if spoken {
                TurnState::Speaking
            } else {
                TurnState::Idle
            };
            inner.machine.transition(next)?;
        }

        tracing::info!(
            session_id = %context.session_id,
            reply_len = reply.text.chars().count(),
            "Turn settled"
        );
        self.publish(ChatEvent::TurnSettled {
            session_id: context.session_id.clone(),
            log_id: reply.log_id.clone(),
            reply_length: reply.text.chars().count(),
        });
        if spoken {
            self.publish(ChatEvent::ReplySpoken {
                session_id: context.session_id.clone(),
            });
        }

        Ok(SendOutcome::Delivered {
            session_id: context.session_id,
            user,
            assistant,
            log_id: reply.log_id,
        })
    }

    fn settle_failure(&self, context: &TurnContext, epoch: u64, err: ChatError) -> ChatError {
        self.release_after_failure(epoch);
        tracing::warn!(
            session_id = %context.session_id,
            error = %err,
            "Turn failed"
        );
        self.publish(ChatEvent::TurnFailed {
            session_id: context.session_id.clone(),
            kind: err.kind(),
            message: err.to_string(),
        });
        err
    }

    /// Leave `Sending` without touching history. The draft survives unless
    /// the session changed mid-flight, in which case it was already
    /// discarded and the controller goes back to `Idle`.
    fn release_after_failure(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.machine.current() != TurnState::Sending {
            return;
        }
        let next = if inner.selection_epoch == epoch && !inner.draft.is_empty() {
            TurnState::Composing
        } else {
            TurnState::Idle
        };
        if let Err(e) = inner.machine.transition(next) {
            tracing::error!(error = %e, "Could not leave Sending");
        }
    }

    // -- Voice --

    /// Capture one utterance and place the transcript in the draft.
    ///
    /// A transcript that arrives after the current session changed, or while
    /// a turn is in flight, is discarded. No turn is sent.
    pub async fn listen(&self) -> Result<ListenOutcome, ChatError> {
        if !self.speech.is_available() {
            return Err(ChatError::SpeechUnavailable);
        }
        let (language, epoch) = {
            let inner = self.lock();
            (inner.language, inner.selection_epoch)
        };

        if !self.speech.is_listening() {
            self.publish(ChatEvent::ListenStarted { language });
        }
        let transcript = match self.speech.start_listening(language).await {
            Ok(text) => text,
            Err(e) => {
                if let ChatError::ListenFailed(reason) = &e {
                    self.publish(ChatEvent::ListenFailed {
                        reason: reason.clone(),
                    });
                }
                return Err(e);
            }
        };

        {
            let mut inner = self.lock();
            let stale = inner.selection_epoch != epoch
                || inner.machine.current() == TurnState::Sending;
            if !stale {
                inner.draft = transcript.clone();
                inner.machine.ensure(TurnState::Composing)?;
            }
            drop(inner);

            if stale {
                tracing::debug!(
                    text_len = transcript.chars().count(),
                    "Stale transcript discarded"
                );
                self.publish(ChatEvent::TranscriptDiscarded {
                    text_length: transcript.chars().count(),
                });
                return Ok(ListenOutcome::Discarded);
            }
        }

        self.publish(ChatEvent::TranscriptReady {
            text_length: transcript.chars().count(),
        });
        Ok(ListenOutcome::Transcribed(transcript))
    }

    /// Playback of the last reply ended.
    pub fn finish_speaking(&self) {
        let mut inner = self.lock();
        if inner.machine.current() == TurnState::Speaking {
            if let Err(e) = inner.machine.transition(TurnState::Idle) {
                tracing::error!(error = %e, "Could not leave Speaking");
            }
        }
    }

    // -- Sessions --

    /// Fetch sessions from the backend and select the newest, creating one
    /// if none exist.
    pub async fn load_sessions(&self) -> Result<Vec<Session>, ChatError> {
        let sessions = self.store.load_sessions().await?;
        self.reset_for_selection();
        self.publish(ChatEvent::SessionsLoaded {
            count: sessions.len(),
        });
        Ok(sessions)
    }

    /// Create a session, make it current and discard the draft.
    pub async fn new_session(&self) -> Result<Session, ChatError> {
        let session = self.store.create_session().await?;
        self.reset_for_selection();
        self.publish(ChatEvent::SessionCreated {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    /// Make another session current, discarding any uncommitted draft.
    ///
    /// Selecting the already-current session changes nothing.
    pub fn switch_session(&self, session_id: &str) -> Result<Session, ChatError> {
        if self.store.current_id().as_deref() == Some(session_id) {
            return self
                .store
                .get(session_id)
                .ok_or_else(|| ChatError::NotFound(session_id.to_string()));
        }
        let session = self.store.select_session(session_id)?;
        self.reset_for_selection();
        self.publish(ChatEvent::SessionSelected {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    fn reset_for_selection(&self) {
        let mut inner = self.lock();
        inner.selection_epoch += 1;
        inner.draft.clear();
        if matches!(
            inner.machine.current(),
            TurnState::Composing | TurnState::Speaking
        ) {
            if let Err(e) = inner.machine.transition(TurnState::Idle) {
                tracing::error!(error = %e, "Could not reset to Idle");
            }
        }
    }

    // -- Feedback --

    /// Rate a reply by its interaction log id.
    pub async fn rate_reply(&self, log_id: &str, rating: u8) -> Result<(), ChatError> {
        self.transport.rate_reply(log_id, rating).await?;
        tracing::info!(log_id = %log_id, rating, "Reply rated");
        Ok(())
    }

    /// Rate the most recent reply that carried a log id.
    pub async fn rate_last_reply(&self, rating: u8) -> Result<(), ChatError> {
        let log_id = self
            .last_log_id()
            .ok_or_else(|| ChatError::InvalidInput("no reply to rate yet".to_string()))?;
        self.rate_reply(&log_id, rating).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{SpeechPlatform, SpeechPlatformError};
    use crate::transport::{validate_rating, SessionBackend};
    use crate::types::SessionRecord;
    use async_trait::async_trait;
    use chrono::Utc;
    use smartgov_core::config::SpeechConfig;
    use smartgov_core::Role;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeBackend {
        next_id: AtomicUsize,
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn create_session(&self) -> Result<SessionRecord, ChatError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SessionRecord {
                id: id.to_string(),
                title: None,
                created_at: Utc::now(),
                messages: vec![],
            })
        }

        async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ChatError> {
            Ok(vec![])
        }
    }

    /// Transport answering from a script, optionally holding each call until
    /// the gate opens.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<TurnReply, ChatError>>>,
        gate: Option<Arc<Notify>>,
        calls: Mutex<Vec<(TurnContext, String)>>,
        ratings: Mutex<Vec<(String, u8)>>,
    }

    impl ScriptedTransport {
        fn reply(text: &str, log_id: Option<&str>) -> Result<TurnReply, ChatError> {
            Ok(TurnReply {
                text: text.to_string(),
                log_id: log_id.map(str::to_string),
            })
        }

        fn with(replies: Vec<Result<TurnReply, ChatError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageTransport for ScriptedTransport {
        async fn send_turn(
            &self,
            context: &TurnContext,
            text: &str,
        ) -> Result<TurnReply, ChatError> {
            self.calls
                .lock()
                .unwrap()
                .push((context.clone(), text.to_string()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::NetworkFailure("no script".to_string())))
        }

        async fn rate_reply(&self, log_id: &str, rating: u8) -> Result<(), ChatError> {
            validate_rating(rating)?;
            self.ratings
                .lock()
                .unwrap()
                .push((log_id.to_string(), rating));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
        transcript: Mutex<Option<String>>,
    }

    #[async_trait]
    impl SpeechPlatform for RecordingSpeech {
        fn is_supported(&self) -> bool {
            true
        }

        async fn recognize_once(&self, _locale: &str) -> Result<String, SpeechPlatformError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.transcript
                .lock()
                .unwrap()
                .take()
                .ok_or(SpeechPlatformError::NoSpeech)
        }

        fn speak(&self, text: &str, _locale: &str) -> Result<(), SpeechPlatformError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        controller: Arc<TurnController>,
        transport: Arc<ScriptedTransport>,
        speech: Arc<RecordingSpeech>,
    }

    async fn harness(transport: ScriptedTransport, speech: RecordingSpeech) -> Harness {
        let store = Arc::new(SessionStore::new(Arc::new(FakeBackend::default()), 50));
        let transport = Arc::new(transport);
        let speech = Arc::new(speech);
        let bridge = SpeechBridge::new(speech.clone(), SpeechConfig::default());
        let controller = Arc::new(TurnController::new(
            store,
            transport.clone(),
            bridge,
            ChatConfig::default(),
        ));
        controller.new_session().await.unwrap();
        Harness {
            controller,
            transport,
            speech,
        }
    }

    async fn wait_for_state(controller: &TurnController, state: TurnState) {
        while controller.state() != state {
            tokio::task::yield_now().await;
        }
    }

    // ---- Input ----

    #[tokio::test]
    async fn test_keystroke_moves_idle_to_composing() {
        let h = harness(ScriptedTransport::default(), RecordingSpeech::default()).await;
        assert_eq!(h.controller.state(), TurnState::Idle);
        assert!(h.controller.set_draft("Wha").unwrap());
        assert_eq!(h.controller.state(), TurnState::Composing);
        assert_eq!(h.controller.draft(), "Wha");
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_send_without_session_is_rejected() {
        let store = Arc::new(SessionStore::new(Arc::new(FakeBackend::default()), 50));
        let transport = Arc::new(ScriptedTransport::default());
        let controller = TurnController::new(
            store,
            transport.clone(),
            SpeechBridge::unavailable(),
            ChatConfig::default(),
        );
        controller.set_draft("hello").unwrap();
        let result = controller.send().await;
        assert!(matches!(result, Err(ChatError::NoCurrentSession)));
        assert_eq!(controller.state(), TurnState::Composing);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_overlong_draft_is_invalid_input() {
        let h = harness(ScriptedTransport::default(), RecordingSpeech::default()).await;
        h.controller.set_draft("a".repeat(2001)).unwrap();
        let result = h.controller.send().await;
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));
        assert_eq!(h.transport.call_count(), 0);
    }

    // ---- Sending ----

    #[tokio::test]
    async fn test_send_captures_language_and_category() {
        let h = harness(
            ScriptedTransport::with(vec![ScriptedTransport::reply("ok", None)]),
            RecordingSpeech::default(),
        )
        .await;
        h.controller.set_language(Language::Hindi);
        h.controller.set_category(Category::Documents);
        h.controller.set_draft("  kaun se dastavez?  ").unwrap();
        h.controller.send().await.unwrap();

        let calls = h.transport.calls.lock().unwrap();
        let (context, text) = &calls[0];
        assert_eq!(context.language, Language::Hindi);
        assert_eq!(context.category, Category::Documents);
        // Sent exactly as typed; blank-only drafts are the only ones refused.
        assert_eq!(text, "  kaun se dastavez?  ");

        let id = h.controller.store().current_id().unwrap();
        let log = h.controller.store().messages(&id).unwrap();
        assert_eq!(log[0].text, "  kaun se dastavez?  ");
    }

    #[tokio::test]
    async fn test_success_speaks_reply_and_enters_speaking() {
        let h = harness(
            ScriptedTransport::with(vec![ScriptedTransport::reply("Namaste", Some("31"))]),
            RecordingSpeech::default(),
        )
        .await;
        h.controller.set_draft("hello").unwrap();
        let outcome = h.controller.send().await.unwrap();

        assert!(matches!(outcome, SendOutcome::Delivered { ref log_id, .. } if log_id.as_deref() == Some("31")));
        assert_eq!(h.controller.state(), TurnState::Speaking);
        assert_eq!(h.controller.draft(), "");
        assert_eq!(h.speech.spoken.lock().unwrap().as_slice(), ["Namaste"]);
        assert_eq!(h.controller.last_log_id().as_deref(), Some("31"));

        h.controller.finish_speaking();
        assert_eq!(h.controller.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_speak_replies_off_settles_to_idle() {
        let store = Arc::new(SessionStore::new(Arc::new(FakeBackend::default()), 50));
        let speech = Arc::new(RecordingSpeech::default());
        let controller = TurnController::new(
            store,
            Arc::new(ScriptedTransport::with(vec![ScriptedTransport::reply(
                "ok", None,
            )])),
            SpeechBridge::new(speech.clone(), SpeechConfig::default()),
            ChatConfig {
                speak_replies: false,
                ..ChatConfig::default()
            },
        );
        controller.new_session().await.unwrap();
        controller.set_draft("hello").unwrap();
        controller.send().await.unwrap();
        assert_eq!(controller.state(), TurnState::Idle);
        assert!(speech.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typing_while_speaking_composes() {
        let h = harness(
            ScriptedTransport::with(vec![ScriptedTransport::reply("ok", None)]),
            RecordingSpeech::default(),
        )
        .await;
        h.controller.set_draft("hello").unwrap();
        h.controller.send().await.unwrap();
        assert_eq!(h.controller.state(), TurnState::Speaking);
        h.controller.set_draft("next").unwrap();
        assert_eq!(h.controller.state(), TurnState::Composing);
    }

    #[tokio::test]
    async fn test_draft_locked_while_sending() {
        let gate = Arc::new(Notify::new());
        let transport = ScriptedTransport {
            gate: Some(gate.clone()),
            ..ScriptedTransport::with(vec![ScriptedTransport::reply("ok", None)])
        };
        let h = harness(transport, RecordingSpeech::default()).await;
        h.controller.set_draft("first").unwrap();

        let background = h.controller.clone();
        let task = tokio::spawn(async move { background.send().await });
        wait_for_state(&h.controller, TurnState::Sending).await;

        assert!(!h.controller.set_draft("edited").unwrap());
        assert_eq!(h.controller.draft(), "first");

        gate.notify_one();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_switch_during_send_settles_into_original_session() {
        let gate = Arc::new(Notify::new());
        let transport = ScriptedTransport {
            gate: Some(gate.clone()),
            ..ScriptedTransport::with(vec![ScriptedTransport::reply("reply", None)])
        };
        let h = harness(transport, RecordingSpeech::default()).await;
        let origin = h.controller.store().current_id().unwrap();
        h.controller.set_draft("question").unwrap();

        let background = h.controller.clone();
        let task = tokio::spawn(async move { background.send().await });
        wait_for_state(&h.controller, TurnState::Sending).await;

        let other = h.controller.new_session().await.unwrap();
        assert_eq!(h.controller.state(), TurnState::Sending);

        gate.notify_one();
        task.await.unwrap().unwrap();

        let store = h.controller.store();
        assert_eq!(store.messages(&origin).unwrap().len(), 2);
        assert!(store.messages(&other.id).unwrap().is_empty());
        assert_eq!(store.current_id(), Some(other.id));
        // Reply belongs to a session no longer shown: not spoken.
        assert_eq!(h.controller.state(), TurnState::Idle);
        assert!(h.speech.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_switch_away_and_back_during_send_still_speaks_reply() {
        let gate = Arc::new(Notify::new());
        let transport = ScriptedTransport {
            gate: Some(gate.clone()),
            ..ScriptedTransport::with(vec![ScriptedTransport::reply("Namaste", None)])
        };
        let h = harness(transport, RecordingSpeech::default()).await;
        let origin = h.controller.store().current_id().unwrap();
        h.controller.set_draft("question").unwrap();

        let background = h.controller.clone();
        let task = tokio::spawn(async move { background.send().await });
        wait_for_state(&h.controller, TurnState::Sending).await;

        h.controller.new_session().await.unwrap();
        h.controller.switch_session(&origin).unwrap();

        gate.notify_one();
        task.await.unwrap().unwrap();

        assert_eq!(h.controller.state(), TurnState::Speaking);
        assert_eq!(h.speech.spoken.lock().unwrap().as_slice(), ["Namaste"]);
        assert_eq!(h.controller.store().messages(&origin).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_after_switch_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let transport = ScriptedTransport {
            gate: Some(gate.clone()),
            ..ScriptedTransport::with(vec![Err(ChatError::NetworkFailure(
                "timeout".to_string(),
            ))])
        };
        let h = harness(transport, RecordingSpeech::default()).await;
        h.controller.set_draft("question").unwrap();

        let background = h.controller.clone();
        let task = tokio::spawn(async move { background.send().await });
        wait_for_state(&h.controller, TurnState::Sending).await;
        h.controller.new_session().await.unwrap();

        gate.notify_one();
        assert!(task.await.unwrap().is_err());
        assert_eq!(h.controller.state(), TurnState::Idle);
        assert_eq!(h.controller.draft(), "");
    }

    #[tokio::test]
    async fn test_dropped_send_releases_lock_and_keeps_draft() {
        let gate = Arc::new(Notify::new());
        let transport = ScriptedTransport {
            gate: Some(gate),
            ..ScriptedTransport::default()
        };
        let h = harness(transport, RecordingSpeech::default()).await;
        h.controller.set_draft("question").unwrap();

        let background = h.controller.clone();
        let task = tokio::spawn(async move { background.send().await });
        wait_for_state(&h.controller, TurnState::Sending).await;
        task.abort();
        let _ = task.await;

        assert_eq!(h.controller.state(), TurnState::Composing);
        assert_eq!(h.controller.draft(), "question");
    }

    #[tokio::test]
    async fn test_failure_event_published() {
        let h = harness(
            ScriptedTransport::with(vec![Err(ChatError::BackendRejected {
                status: Some(401),
                message: "Invalid token.".to_string(),
            })]),
            RecordingSpeech::default(),
        )
        .await;
        let mut events = h.controller.subscribe();
        h.controller.set_draft("hello").unwrap();
        let err = h.controller.send().await.unwrap_err();
        assert!(matches!(err, ChatError::BackendRejected { status: Some(401), .. }));

        assert!(matches!(events.recv().await.unwrap(), ChatEvent::TurnStarted { .. }));
        match events.recv().await.unwrap() {
            ChatEvent::TurnFailed { kind, .. } => {
                assert_eq!(kind, smartgov_core::FailureKind::BackendRejected)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // ---- Sessions ----

    #[tokio::test]
    async fn test_switch_to_unknown_session_keeps_draft() {
        let h = harness(ScriptedTransport::default(), RecordingSpeech::default()).await;
        h.controller.set_draft("keep me").unwrap();
        let result = h.controller.switch_session("404");
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        assert_eq!(h.controller.draft(), "keep me");
        assert_eq!(h.controller.state(), TurnState::Composing);
    }

    #[tokio::test]
    async fn test_reselecting_current_session_keeps_draft() {
        let h = harness(ScriptedTransport::default(), RecordingSpeech::default()).await;
        let current = h.controller.store().current_id().unwrap();
        h.controller.set_draft("keep me").unwrap();
        h.controller.switch_session(&current).unwrap();
        assert_eq!(h.controller.draft(), "keep me");
    }

    #[tokio::test]
    async fn test_load_sessions_creates_when_empty_and_resets_draft() {
        let h = harness(ScriptedTransport::default(), RecordingSpeech::default()).await;
        h.controller.set_draft("draft").unwrap();
        let sessions = h.controller.load_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(h.controller.draft(), "");
        assert_eq!(h.controller.state(), TurnState::Idle);
    }

    // ---- Voice ----

    #[tokio::test]
    async fn test_listen_unavailable() {
        let store = Arc::new(SessionStore::new(Arc::new(FakeBackend::default()), 50));
        let controller = TurnController::new(
            store,
            Arc::new(ScriptedTransport::default()),
            SpeechBridge::unavailable(),
            ChatConfig::default(),
        );
        assert!(!controller.voice_available());
        assert!(matches!(
            controller.listen().await,
            Err(ChatError::SpeechUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_listen_failure_leaves_draft_and_state() {
        let h = harness(ScriptedTransport::default(), RecordingSpeech::default()).await;
        let result = h.controller.listen().await;
        assert!(matches!(result, Err(ChatError::ListenFailed(_))));
        assert!(!h.controller.is_listening());
        assert_eq!(h.controller.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_transcript_after_session_switch_is_discarded() {
        let gate = Arc::new(Notify::new());
        let speech = RecordingSpeech {
            gate: Some(gate.clone()),
            transcript: Mutex::new(Some("old session words".to_string())),
            ..RecordingSpeech::default()
        };
        let h = harness(ScriptedTransport::default(), speech).await;

        let background = h.controller.clone();
        let task = tokio::spawn(async move { background.listen().await });
        while !h.controller.is_listening() {
            tokio::task::yield_now().await;
        }

        h.controller.new_session().await.unwrap();
        gate.notify_one();

        assert_eq!(task.await.unwrap().unwrap(), ListenOutcome::Discarded);
        assert_eq!(h.controller.draft(), "");
        assert_eq!(h.controller.state(), TurnState::Idle);
        assert!(!h.controller.is_listening());
    }

    // ---- Rating ----

    #[tokio::test]
    async fn test_rate_last_reply() {
        let h = harness(
            ScriptedTransport::with(vec![ScriptedTransport::reply("ok", Some("88"))]),
            RecordingSpeech::default(),
        )
        .await;
        assert!(matches!(
            h.controller.rate_last_reply(5).await,
            Err(ChatError::InvalidInput(_))
        ));

        h.controller.set_draft("hello").unwrap();
        h.controller.send().await.unwrap();
        h.controller.rate_last_reply(4).await.unwrap();
        assert_eq!(
            h.transport.ratings.lock().unwrap().as_slice(),
            [("88".to_string(), 4)]
        );

        assert!(matches!(
            h.controller.rate_reply("88", 9).await,
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_history_roles_alternate_over_many_turns() {
        let replies = (0..5)
            .map(|i| ScriptedTransport::reply(&format!("a{i}"), None))
            .collect();
        let h = harness(ScriptedTransport::with(replies), RecordingSpeech::default()).await;
        for i in 0..5 {
            h.controller.set_draft(format!("q{i}")).unwrap();
            h.controller.send().await.unwrap();
        }
        let id = h.controller.store().current_id().unwrap();
        let log = h.controller.store().messages(&id).unwrap();
        assert_eq!(log.len(), 10);
        for (i, msg) in log.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(msg.role, expected);
        }
    }
}
