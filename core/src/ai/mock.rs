//! Deterministic stand-ins for the translation service
//!
//! These let the retry loop, the orchestrator and the archive pipeline be
//! exercised without network access or real waiting.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{
    AttemptFailure, ChatCompletionRequest, ChatCompletionResponse, ChatTransport,
    TranslationOutcome, UnitTranslator,
};
use crate::time::Sleeper;

/// One scripted reply of a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// HTTP 200 with a single choice carrying this content.
    Content(String),
    /// Non-OK HTTP status.
    Status(u16),
    /// Transport failure.
    Network,
    /// HTTP 200 with a body that is not valid JSON.
    Malformed,
    /// HTTP 200 with `"choices": []`.
    EmptyChoices,
}

impl MockReply {
    fn resolve(&self) -> Result<ChatCompletionResponse, AttemptFailure> {
        match self {
            MockReply::Content(content) => Ok(ChatCompletionResponse::with_content(content.clone())),
            MockReply::Status(code) => Err(AttemptFailure::Status {
                status: StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body: String::new(),
            }),
            MockReply::Network => Err(AttemptFailure::Network("connection reset".into())),
            MockReply::Malformed => ChatCompletionResponse::parse("{\"choices\": ["),
            MockReply::EmptyChoices => Ok(ChatCompletionResponse::default()),
        }
    }
}

/// Replays a fixed sequence of replies, then repeats a fallback forever.
#[derive(Debug)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: MockReply::Network,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: MockReply) -> Self {
        Self::new([]).with_fallback(reply)
    }

    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AttemptFailure> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.as_ref().unwrap_or(&self.fallback).resolve()
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Behaviour of a [`MockTranslator`].
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Prefix the markup: `"Hello"` becomes `"[de] Hello"` for prefix `"[de] "`.
    Prefix(String),
    /// Look the markup up; unknown markup fails.
    Mappings(HashMap<String, String>),
    /// Every unit fails.
    Fail,
}

/// Unit-level translator that records every markup it was asked to translate.
#[derive(Debug)]
pub struct MockTranslator {
    mode: MockMode,
    calls: Mutex<Vec<String>>,
}

impl MockTranslator {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl UnitTranslator for MockTranslator {
    async fn translate(&self, markup: &str, _target_language: &str) -> TranslationOutcome {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(markup.to_string());

        match &self.mode {
            MockMode::Prefix(prefix) => TranslationOutcome::Translated(format!("{prefix}{markup}")),
            MockMode::Mappings(map) => match map.get(markup) {
                Some(translated) => TranslationOutcome::Translated(translated.clone()),
                None => TranslationOutcome::failed(markup),
            },
            MockMode::Fail => TranslationOutcome::failed(markup),
        }
    }
}
