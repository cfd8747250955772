//! Clarity: linguistic quality of the answer, independent of correctness.

use super::judge::{JudgeClient, coerce_score, parse_json_object, raw_snippet, text_field};
use super::{Metric, MetricContext, MetricFamily};
use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use serde_json::{Map, Value, json};

pub const NAME: &str = "clarity";

const SYSTEM_PROMPT: &str = "You are a deterministic evaluation judge for linguistic clarity. \
Return ONLY valid JSON per the schema.";

fn user_prompt(answer: &str) -> String {
    format!(
        "Metric: clarity.\n\
Evaluate linguistic quality, including grammar, sentence flow, logical organization, conciseness, and ease of reading.\n\
This metric assesses *how well the answer is written*, not whether it is factually correct.\n\n\
Scoring guidelines:\n\
  - 0.9-1.0: Very clear, well-structured, fluent, and easy to read.\n\
  - 0.7-0.8: Mostly clear with minor issues.\n\
  - 0.4-0.6: Noticeable clarity or flow problems.\n\
  - <0.4: Unclear, disorganized, or difficult to read.\n\n\
Short answers:\n\
  - If the answer is short (1-10 words), evaluate BOTH grammaticality and whether the phrasing is readable, natural, and understandable to a general audience.\n\
  - Do NOT blindly give high scores to short one-word or fragment answers if they are abrupt, unnatural, or unclear.\n\n\
ANSWER:\n{answer}\n\n\
Return compact JSON only, exactly in this format:\n\
{{\n\
  \"score\": <float between 0.0 and 1.0>,\n\
  \"explanation\": \"<1-2 sentence summary of the clarity assessment>\",\n\
  \"issues\": [\"...\"],\n\
  \"suggestions\": \"<1-2 short suggestions for improving clarity>\"\n\
}}\n\
Only JSON. No commentary, markup, or extra text."
    )
}

pub struct Clarity {
    judge: JudgeClient,
}

impl Clarity {
    pub fn new(ctx: &MetricContext) -> Self {
        Self {
            judge: ctx.judge.clone(),
        }
    }
}

#[async_trait]
impl Metric for Clarity {
    fn name(&self) -> &str {
        NAME
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Answer
    }

    async fn evaluate(
        &self,
        input: &JudgeInput,
        settings: &JudgeSettings,
    ) -> Result<MetricOutcome, MetricError> {
        let text = self
            .judge
            .complete_json(SYSTEM_PROMPT, &user_prompt(&input.answer), settings)
            .await?;

        let Some(obj) = parse_json_object(&text) else {
            let mut details = Map::new();
            details.insert("issues".into(), json!([]));
            details.insert("suggestions".into(), json!(""));
            details.insert("raw_text".into(), Value::String(raw_snippet(&text)));
            return Ok(MetricOutcome::error("Could not parse JSON from model output.", details));
        };

        let score = coerce_score(obj.get("score"));
        let explanation = text_field(&obj, "explanation");
        let issues = match obj.get("issues") {
            Some(Value::Array(items)) => Value::Array(items.clone()),
            _ => json!([]),
        };
        // Judges sometimes answer with a list of suggestions.
        let suggestions = match obj.get("suggestions") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|s| s.as_str().map(str::to_string).unwrap_or_else(|| s.to_string()))
                .collect::<Vec<_>>()
                .join(" "),
            _ => text_field(&obj, "suggestions"),
        };

        let mut details = Map::new();
        details.insert("issues".into(), issues);
        details.insert("suggestions".into(), Value::String(suggestions));
        details.insert("raw".into(), Value::Object(obj));

        Ok(MetricOutcome::Structured {
            score,
            explanation: (!explanation.is_empty()).then_some(explanation),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricResult;
    use pretty_assertions::assert_eq;
    use ragjudge_core::MockLlmProvider;
    use std::sync::Arc;

    async fn run(response: &str) -> MetricResult {
        let m = Clarity::new(&MetricContext::for_provider(Arc::new(
            MockLlmProvider::with_response(response),
        )));
        let outcome = m
            .evaluate(&JudgeInput::new("q", "Paris is the capital.", vec![]), &JudgeSettings::default())
            .await
            .unwrap();
        MetricResult::from_outcome(NAME, outcome)
    }

    #[tokio::test]
    async fn test_clarity_fields() {
        let r = run(
            r#"{"score": 0.9, "explanation": "Clear.", "issues": [], "suggestions": "None."}"#,
        )
        .await;
        assert_eq!(r.score, 0.9);
        assert_eq!(r.explanation.as_deref(), Some("Clear."));
        assert_eq!(r.details["suggestions"], "None.");
    }

    #[tokio::test]
    async fn test_list_suggestions_joined() {
        let r = run(r#"{"score": 0.6, "suggestions": ["Add a verb.", "Shorten."]}"#).await;
        assert_eq!(r.details["suggestions"], "Add a verb. Shorten.");
    }

    #[tokio::test]
    async fn test_fenced_json_parsed() {
        let r = run("```json\n{\"score\": 0.3, \"issues\": [\"fragment\"]}\n```").await;
        assert_eq!(r.score, 0.3);
        assert_eq!(r.details["issues"], json!(["fragment"]));
    }
}
