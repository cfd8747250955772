//! Judge backend abstraction.
//!
//! `LlmProvider` is the seam between the evaluation metrics and whatever
//! chat-completion endpoint acts as the judge. `MockLlmProvider` is a
//! scriptable stand-in used throughout the test suites.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Trait for judge LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the default model name.
    fn model_name(&self) -> &str;

    /// Whether the provider honours `ResponseFormat::JsonObject`.
    fn supports_json_mode(&self) -> bool {
        true
    }
}

/// A mock LLM provider for testing.
///
/// Responses are resolved in this order: a failing model, a route whose
/// needle appears in any request message, the FIFO queue, the fallback text.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<CompletionResponse>>,
    routes: Mutex<Vec<(String, String)>>,
    failing_models: Mutex<HashSet<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fallback: String,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            routes: Mutex::new(Vec::new()),
            failing_models: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
            fallback: "I'm a mock LLM. No queued responses available.".to_string(),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next unrouted `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        lock(&self.responses).push_back(response);
    }

    /// Queue a plain text response.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Answer with `text` whenever any message of the request contains `needle`.
    pub fn route(self, needle: &str, text: &str) -> Self {
        lock(&self.routes).push((needle.to_string(), text.to_string()));
        self
    }

    /// Fail every request whose effective model is `model`.
    pub fn fail_model(self, model: &str) -> Self {
        lock(&self.failing_models).insert(model.to_string());
        self
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    fn routed(&self, request: &CompletionRequest) -> Option<String> {
        let routes = lock(&self.routes);
        routes
            .iter()
            .find(|(needle, _)| {
                request
                    .messages
                    .iter()
                    .any(|m| m.content.contains(needle.as_str()))
            })
            .map(|(_, text)| text.clone())
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        lock(&self.requests).push(request.clone());

        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        if lock(&self.failing_models).contains(&model) {
            return Err(LlmError::ApiRequest {
                message: format!("mock failure for model {model}"),
            });
        }

        if let Some(text) = self.routed(&request) {
            return Ok(Self::text_response(&text));
        }

        let queued = lock(&self.responses).pop_front();
        Ok(queued.unwrap_or_else(|| Self::text_response(&self.fallback)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
