//! Shared foundation for the SmartGov conversational front end.
//!
//! Configuration, the top-level error type, wire-level domain enums and the
//! events the turn controller publishes.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::SmartGovConfig;
pub use error::{Result, SmartGovError};
pub use events::ChatEvent;
pub use types::*;
