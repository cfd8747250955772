//! Judge client and defensive parsing of judge output.

use ragjudge_core::{
    CompletionRequest, JudgeSettings, LlmError, LlmProvider, Message, ResponseFormat,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").expect("valid number regex")
});

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma regex"));

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^```(?:json)?\s*(.*?)\s*```$").expect("valid fence regex")
});

/// Thin wrapper over an `LlmProvider` that speaks system+user prompts.
#[derive(Clone)]
pub struct JudgeClient {
    provider: Arc<dyn LlmProvider>,
}

impl JudgeClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Ask the judge for a JSON object; returns the raw text.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
        settings: &JudgeSettings,
    ) -> Result<String, LlmError> {
        self.complete(system, user, settings, ResponseFormat::JsonObject)
            .await
    }

    /// Ask the judge for free text.
    pub async fn complete_text(
        &self,
        system: &str,
        user: &str,
        settings: &JudgeSettings,
    ) -> Result<String, LlmError> {
        self.complete(system, user, settings, ResponseFormat::Text)
            .await
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        settings: &JudgeSettings,
        format: ResponseFormat,
    ) -> Result<String, LlmError> {
        let response_format = if format == ResponseFormat::JsonObject
            && !self.provider.supports_json_mode()
        {
            ResponseFormat::Text
        } else {
            format
        };
        let request = CompletionRequest {
            messages: vec![Message::system(system), Message::user(user)],
            temperature: settings.temperature,
            response_format,
            model: Some(settings.model.clone()),
            ..Default::default()
        };
        debug!(
            model = %settings.model,
            temperature = settings.temperature,
            "Calling judge"
        );
        let response = self.provider.complete(request).await?;
        Ok(response.message.content)
    }
}

/// Extract the first JSON object from judge output.
///
/// Tries, in order: the fence-stripped text, the first balanced `{...}`
/// substring, and that substring with trailing commas removed.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    let body = FENCE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        return Some(obj);
    }

    let fragment = first_balanced_object(body)?;
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(fragment) {
        return Some(obj);
    }

    let repaired = TRAILING_COMMA_RE.replace_all(fragment, "$1");
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// First `{...}` substring whose braces balance, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerce a judge-reported score: a number, or the first number inside a
/// string, clamped into `[0, 1]`. Anything else is `0.0`.
pub fn coerce_score(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => NUMBER_RE
            .find(s)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    crate::types::clip01(raw)
}

/// Collapse runs of whitespace and trim.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read a JSON value as a boolean, accepting `"true"`/`"yes"` strings.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

/// Read a JSON value as trimmed text, empty for null or missing.
pub fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// First 500 characters of raw judge output, for error details.
pub fn raw_snippet(text: &str) -> String {
    text.chars().take(500).collect()
}
