//! Conversational core for the SmartGov advisory assistant.
//!
//! Sessions, the request/response transport to the advisory backend, voice
//! input and output, and the turn controller that ties them together.

pub mod controller;
pub mod error;
pub mod speech;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;

pub use controller::TurnController;
pub use error::ChatError;
pub use speech::{NoSpeechPlatform, SpeechBridge, SpeechPlatform, SpeechPlatformError};
pub use state::{StateMachine, TurnState};
pub use store::SessionStore;
pub use transport::{HttpTransport, MessageTransport, SessionBackend};
pub use types::{
    ListenOutcome, Message, MessageRecord, Session, SessionRecord, SendOutcome, TurnContext,
    TurnReply, UNTITLED,
};
