pub mod mock;
pub mod retry;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::time::Sleeper;
use retry::{FailureKind, RetryDecision, RetryPolicy, RetryState};

/// Appended (after a space) to the original markup of a unit whose retries ran out.
pub const FAILURE_MARKER: &str =
    "<span style='color: gray; font-size: 0.8em;'>(⚠️ Translation failed)</span>";

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Builds the system instruction sent ahead of every unit.
pub fn system_instruction(target_language: &str) -> String {
    format!(
        "You are a professional translator. Translate to {target_language}. \
         Keep all HTML tags exactly as they are. Output ONLY the translated content."
    )
}

/// Why a single attempt did not produce a translation. Every variant is retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("network error: {0}")]
    Network(String),
    #[error("status {status}")]
    Status { status: StatusCode, body: String },
    #[error("malformed response body: {0}")]
    MalformedBody(String),
    #[error("response contained no choices")]
    EmptyChoices,
    #[error("first choice had no content")]
    EmptyContent,
}

impl AttemptFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            AttemptFailure::Network(_) => FailureKind::Network,
            AttemptFailure::Status { status, .. } => FailureKind::from_status(*status),
            AttemptFailure::MalformedBody(_)
            | AttemptFailure::EmptyChoices
            | AttemptFailure::EmptyContent => FailureKind::InvalidResponse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Body of one chat-completions call: the instruction plus one unit of markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatCompletionRequest {
    pub fn for_markup(model: &str, target_language: &str, markup: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: system_instruction(target_language),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: markup.to_string(),
                },
            ],
        }
    }

    /// The markup carried by the user message.
    pub fn markup(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatChoiceMessage {
    /// Missing, null or whitespace-only content is treated as a failed
    /// attempt and retried. Every unit sent is non-blank, so a blank reply
    /// would erase its text. Once retries run out the unit keeps its source text
    /// followed by the failure marker.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    pub fn parse(body: &str) -> Result<Self, AttemptFailure> {
        serde_json::from_str(body).map_err(|err| AttemptFailure::MalformedBody(err.to_string()))
    }

    /// Response carrying a single choice with `content`.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: ChatChoiceMessage {
                    content: Some(content.into()),
                },
            }],
        }
    }

    /// Trimmed content of the first choice. Blank content is
    /// `AttemptFailure::EmptyContent`, which the retry loop retries.
    pub fn first_content(&self) -> Result<&str, AttemptFailure> {
        let choice = self.choices.first().ok_or(AttemptFailure::EmptyChoices)?;
        let content = choice.message.content.as_deref().unwrap_or_default().trim();
        if content.is_empty() {
            return Err(AttemptFailure::EmptyContent);
        }
        Ok(content)
    }
}

/// Performs exactly one request against the translation service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AttemptFailure>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AttemptFailure> {
        (**self).send(request).await
    }
}

/// OpenAI-compatible chat-completions endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AttemptFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| AttemptFailure::Network(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AttemptFailure::Network(err.to_string()))?;

        if status != StatusCode::OK {
            return Err(AttemptFailure::Status {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        ChatCompletionResponse::parse(&body)
    }
}

/// Terminal result for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Translated(String),
    /// Original markup followed by [`FAILURE_MARKER`].
    Failed(String),
}

impl TranslationOutcome {
    pub fn failed(original: &str) -> Self {
        TranslationOutcome::Failed(format!("{original} {FAILURE_MARKER}"))
    }

    pub fn text(&self) -> &str {
        match self {
            TranslationOutcome::Translated(text) | TranslationOutcome::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TranslationOutcome::Translated(text) | TranslationOutcome::Failed(text) => text,
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, TranslationOutcome::Translated(_))
    }
}

/// The "translate(markup) -> markup" capability the orchestrator drives.
#[async_trait]
pub trait UnitTranslator: Send + Sync {
    async fn translate(&self, markup: &str, target_language: &str) -> TranslationOutcome;
}

#[async_trait]
impl<T: UnitTranslator + ?Sized> UnitTranslator for Arc<T> {
    async fn translate(&self, markup: &str, target_language: &str) -> TranslationOutcome {
        (**self).translate(markup, target_language).await
    }
}

/// Sends units to the service and absorbs transient failures with back-off.
#[derive(Debug)]
pub struct TranslationClient<T, S> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
    model: String,
}

impl<T: ChatTransport, S: Sleeper> TranslationClient<T, S> {
    pub fn new(transport: T, sleeper: S, policy: RetryPolicy, model: impl Into<String>) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            model: model.into(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: ChatTransport, S: Sleeper> UnitTranslator for TranslationClient<T, S> {
    async fn translate(&self, markup: &str, target_language: &str) -> TranslationOutcome {
        let request = ChatCompletionRequest::for_markup(&self.model, target_language, markup);
        let mut state = RetryState::new();

        loop {
            let attempt = state.begin_attempt();
            let failure = match self.transport.send(&request).await {
                Ok(response) => match response.first_content() {
                    Ok(content) => {
                        if attempt > 1 {
                            debug!(
                                "translation succeeded on attempt {}/{}",
                                attempt,
                                self.policy.max_attempts()
                            );
                        }
                        return TranslationOutcome::Translated(content.to_string());
                    }
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };

            match state.record_failure(failure.kind(), &self.policy) {
                RetryDecision::Retry {
                    next_attempt,
                    delay,
                } => {
                    warn!(
                        "translation failed ({}). retry {}/{} in {:?}",
                        failure,
                        next_attempt - 1,
                        self.policy.max_retries,
                        delay
                    );
                    self.sleeper.sleep(delay).await;
                }
                RetryDecision::Exhausted { attempts } => {
                    warn!(
                        "all {} attempts failed for a block (last: {}). keeping original text",
                        attempts, failure
                    );
                    return TranslationOutcome::failed(markup);
                }
            }
        }
    }
}
