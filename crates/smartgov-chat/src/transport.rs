//! Message transport: one request/response exchange per call with the
//! advisory backend.
//!
//! No call retries. Transport-level errors (unreachable, timeout, broken
//! body) become `NetworkFailure`; anything the backend answers that is not a
//! well-formed success becomes `BackendRejected`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use smartgov_core::config::BackendConfig;
use smartgov_core::{Category, Credential, Language};

use crate::error::ChatError;
use crate::types::{opaque_id_opt, SessionRecord, TurnContext, TurnReply};

/// Exchanges conversational turns with the advisory backend.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one turn and return the assistant reply.
    async fn send_turn(&self, context: &TurnContext, text: &str) -> Result<TurnReply, ChatError>;

    /// Record a 1-5 rating against an interaction log id.
    async fn rate_reply(&self, log_id: &str, rating: u8) -> Result<(), ChatError>;
}

/// Allocates and lists sessions on the backend.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn create_session(&self) -> Result<SessionRecord, ChatError>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ChatError>;
}

/// Reject blank text before any I/O.
pub fn validate_turn_text(text: &str) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::InvalidInput(
            "message cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Reject ratings outside 1..=5 before any I/O.
pub fn validate_rating(rating: u8) -> Result<(), ChatError> {
    if !(1..=5).contains(&rating) {
        return Err(ChatError::InvalidInput(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(())
}

// =============================================================================
// HTTP implementation
// =============================================================================

const SEND_MESSAGE_PATH: &str = "/chatbot/chatbot/send_message/";
const RATE_RESPONSE_PATH: &str = "/chatbot/chatbot/rate_response/";
const SESSIONS_PATH: &str = "/chatbot/sessions/";

/// `MessageTransport` and `SessionBackend` over the backend's JSON API.
///
/// The credential is injected at construction and attached to every request.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth_header: String,
}

impl HttpTransport {
    /// Build a transport for `config.base_url` authenticated with `credential`.
    pub fn new(config: &BackendConfig, credential: &Credential) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::NetworkFailure(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header: format!("{} {}", config.auth_scheme, credential.expose()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(self.url(path))
            .header("Authorization", &self.auth_header)
            .json(body)
            .send()
            .await
            .map_err(network_failure)?;
        check_status(response).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(network_failure)?;
        check_status(response).await
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn send_turn(&self, context: &TurnContext, text: &str) -> Result<TurnReply, ChatError> {
        validate_turn_text(text)?;

        let request = SendMessageRequest {
            message: text,
            session_id: &context.session_id,
            language: context.language,
            category: &context.category,
        };

        tracing::debug!(
            session_id = %context.session_id,
            language = %context.language,
            category = %context.category,
            text_len = text.len(),
            "Sending turn"
        );

        let response = self.post_json(SEND_MESSAGE_PATH, &request).await?;
        let parsed: SendMessageResponse = parse_body(response).await?;

        Ok(TurnReply {
            text: parsed.ai_response,
            log_id: parsed.log_id,
        })
    }

    async fn rate_reply(&self, log_id: &str, rating: u8) -> Result<(), ChatError> {
        validate_rating(rating)?;
        let request = RateRequest { log_id, rating };
        self.post_json(RATE_RESPONSE_PATH, &request).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for HttpTransport {
    async fn create_session(&self) -> Result<SessionRecord, ChatError> {
        let response = self
            .post_json(SESSIONS_PATH, &serde_json::json!({}))
            .await?;
        parse_body(response).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ChatError> {
        let response = self.get(SESSIONS_PATH).await?;
        parse_body(response).await
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    message: &'a str,
    session_id: &'a str,
    language: Language,
    category: &'a Category,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ai_response: String,
    #[serde(default, deserialize_with = "opaque_id_opt")]
    log_id: Option<String>,
}

#[derive(Serialize)]
struct RateRequest<'a> {
    log_id: &'a str,
    rating: u8,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(alias = "detail")]
    error: String,
}

// =============================================================================
// Failure classification
// =============================================================================

fn network_failure(err: reqwest::Error) -> ChatError {
    let reason = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "backend unreachable"
    } else {
        "request failed"
    };
    tracing::warn!(error = %err, "{reason}");
    ChatError::NetworkFailure(format!("{reason}: {err}"))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_http_error(status, &body))
}

fn map_http_error(status: StatusCode, body: &str) -> ChatError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });

    tracing::warn!(status = status.as_u16(), "Backend rejected request");
    ChatError::BackendRejected {
        status: Some(status.as_u16()),
        message,
    }
}

async fn parse_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ChatError> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(network_failure)?;
    serde_json::from_slice(&bytes).map_err(|e| ChatError::BackendRejected {
        status: Some(status),
        message: format!("unexpected response shape: {e}"),
    })
}
