//! Answer completeness: share of question aspects the answer explicitly covers.
//!
//! Judged on the answer text alone; contexts are never shown to the judge.

use super::aspects::AspectExtractor;
use super::judge::{JudgeClient, parse_json_object, raw_snippet, text_field, truthy};
use super::{Metric, MetricContext, MetricFamily};
use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use serde_json::{Map, Value, json};

pub const NAME: &str = "answer_completeness";

/// Cap on caller-supplied aspects.
pub const MAX_ASPECTS: usize = 12;
/// Cap on aspects derived from the question.
pub const MAX_DERIVED_ASPECTS: usize = 6;
const EVIDENCE_MAX_WORDS: usize = 20;

const SYSTEM_PROMPT: &str = "You are a strict COMPLETENESS judge. \
Given a list of aspects derived from only the QUESTION, \
decide for each aspect whether the ANSWER explicitly covers it. \
Use the ANSWER text only; do NOT use your internal or external knowledge or retrieved documents. \
Output JSON only.";

fn user_prompt(aspects: &[String], answer: &str) -> String {
    let aspects_json = serde_json::to_string(aspects).unwrap_or_else(|_| "[]".into());
    format!(
        "Aspects (JSON array): {aspects_json}\n\n\
ANSWER:\n{answer}\n\n\
Return JSON with this exact schema:\n\
{{\n\
  \"score\": <float 0..1>,\n\
  \"per_aspect\": [\n\
    {{\"aspect\": \"<text>\", \"covered\": true|false, \"evidence\": \"<<= {EVIDENCE_MAX_WORDS} words quoted from ANSWER or null>\"}}\n\
  ],\n\
  \"explanation\": \"<one line>\"\n\
}}\n\
Rules:\n\
- Mark covered=true only if the ANSWER explicitly provides the information for that aspect.\n\
- If the ANSWER is vague/silent, mark covered=false.\n\
- Evidence must be a short quote (<= {EVIDENCE_MAX_WORDS} words) from the ANSWER itself, or null if not covered.\n\
- JSON only."
    )
}

pub struct AnswerCompleteness {
    judge: JudgeClient,
    aspects: AspectExtractor,
}

impl AnswerCompleteness {
    pub fn new(ctx: &MetricContext) -> Self {
        Self {
            judge: ctx.judge.clone(),
            aspects: AspectExtractor::new(ctx.judge.clone())
                .with_overrides(ctx.config.aspect_override()),
        }
    }

    async fn build_aspects(&self, input: &JudgeInput, settings: &JudgeSettings) -> Vec<String> {
        match input.aspects.as_deref() {
            Some(supplied) if supplied.iter().any(|a| !a.trim().is_empty()) => self
                .aspects
                .get_aspects(&input.question, Some(supplied), MAX_ASPECTS, settings)
                .await,
            _ => self
                .aspects
                .get_aspects(&input.question, None, MAX_DERIVED_ASPECTS, settings)
                .await,
        }
    }
}

/// One row per aspect, aligned to aspect order. `correct` is read as `covered`.
fn align_rows(aspects: &[String], per_aspect: &[Value]) -> Vec<Value> {
    aspects
        .iter()
        .enumerate()
        .map(|(i, aspect)| {
            let rec = per_aspect.get(i).and_then(|r| r.as_object());
            let covered = rec
                .map(|r| truthy(r.get("covered").or_else(|| r.get("correct"))))
                .unwrap_or(false);
            let evidence = rec
                .and_then(|r| r.get("evidence"))
                .filter(|e| !e.is_null())
                .map(|e| e.as_str().map(str::trim).map(str::to_string).unwrap_or_else(|| e.to_string()));
            json!({
                "aspect": aspect,
                "covered": covered,
                "evidence": evidence,
            })
        })
        .collect()
}

#[async_trait]
impl Metric for AnswerCompleteness {
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
        let aspects = self.build_aspects(input, settings).await;

        let text = self
            .judge
            .complete_json(SYSTEM_PROMPT, &user_prompt(&aspects, &input.answer), settings)
            .await?;

        let Some(obj) = parse_json_object(&text) else {
            let mut details = Map::new();
            details.insert("per_aspect".into(), json!([]));
            details.insert("aspects".into(), json!(aspects));
            details.insert("raw_text".into(), Value::String(raw_snippet(&text)));
            return Ok(MetricOutcome::error("Could not parse JSON from model output.", details));
        };

        let per_aspect: &[Value] = match obj.get("per_aspect") {
            Some(Value::Array(rows)) => rows.as_slice(),
            _ => &[],
        };
        let rows = align_rows(&aspects, per_aspect);
        let covered = rows.iter().filter(|r| r["covered"] == json!(true)).count();
        let score = covered as f64 / aspects.len().max(1) as f64;

        let judge_explanation = text_field(&obj, "explanation");
        let explanation = if judge_explanation.is_empty() {
            format!("{}/{} aspects covered.", covered, aspects.len())
        } else {
            judge_explanation
        };

        let mut details = Map::new();
        details.insert("per_aspect".into(), Value::Array(rows));
        details.insert("aspects".into(), json!(aspects));
        details.insert("answer_len".into(), json!(input.answer.chars().count()));
        details.insert("raw".into(), json!({ "llm_output": obj }));

        Ok(MetricOutcome::structured(score, explanation, details))
    }
}
