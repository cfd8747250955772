//! Retrieval coverage: share of question aspects supported by any retrieved document.

use super::aspects::AspectExtractor;
use super::judge::{JudgeClient, parse_json_object, raw_snippet, truthy};
use super::{Metric, MetricContext, MetricFamily};
use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use serde_json::{Map, Value, json};

pub const NAME: &str = "retrieval_coverage";

pub const MAX_ASPECTS: usize = 5;
const EVIDENCE_MAX_WORDS: usize = 10;

fn system_prompt() -> String {
    format!(
        "You are an evidence checker for retrieval coverage.\n\
For each aspect of the QUESTION, decide if it is supported by ANY of the given documents.\n\
- Keep \"evidence\" at most {EVIDENCE_MAX_WORDS} words and quote from the documents if covered; \
otherwise use an empty string \"\".\n\
Be strict: set covered=true only if the evidence clearly supports the aspect.\n\
Do NOT fabricate evidence; it must be a direct quote or very close extract from the given documents.\n\
Return ONLY JSON with this exact structure:\n\
{{\n\
  \"aspects\": [\n\
    {{ \"aspect\": \"<string>\", \"covered\": true|false, \"evidence\": \"<={EVIDENCE_MAX_WORDS} words or empty string\" }},\n\
    ...\n\
  ]\n\
}}\n"
    )
}

pub(crate) fn numbered_documents(contexts: &[String]) -> String {
    if contexts.is_empty() {
        return "(no documents provided)".to_string();
    }
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[Doc {}] {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn user_prompt(question: &str, aspects: &[String], contexts: &[String]) -> String {
    let aspects_json = serde_json::to_string(aspects).unwrap_or_else(|_| "[]".into());
    format!(
        "QUESTION:\n{question}\n\n\
ASPECTS (ordered):\n{aspects_json}\n\n\
DOCUMENTS:\n{}\n\n\
JSON only.",
        numbered_documents(contexts)
    )
}

fn uncovered_rows(aspects: &[String]) -> Vec<Value> {
    aspects
        .iter()
        .map(|a| json!({"aspect": a, "covered": false, "evidence": ""}))
        .collect()
}

pub struct RetrievalCoverage {
    judge: JudgeClient,
    aspects: AspectExtractor,
}

impl RetrievalCoverage {
    pub fn new(ctx: &MetricContext) -> Self {
        Self {
            judge: ctx.judge.clone(),
            aspects: AspectExtractor::new(ctx.judge.clone())
                .with_overrides(ctx.config.aspect_override()),
        }
    }
}

#[async_trait]
impl Metric for RetrievalCoverage {
    fn name(&self) -> &str {
        NAME
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Retrieval
    }

    async fn evaluate(
        &self,
        input: &JudgeInput,
        settings: &JudgeSettings,
    ) -> Result<MetricOutcome, MetricError> {
        let aspects = self
            .aspects
            .get_aspects(&input.question, input.aspects.as_deref(), MAX_ASPECTS, settings)
            .await;

        let raw = json!({
            "question": input.question,
            "aspects": aspects,
            "contexts_count": input.contexts.len(),
            "model": settings.model,
        });

        let text = self
            .judge
            .complete_json(
                &system_prompt(),
                &user_prompt(&input.question, &aspects, &input.contexts),
                settings,
            )
            .await?;

        let Some(obj) = parse_json_object(&text) else {
            let mut details = Map::new();
            details.insert("per_aspect".into(), Value::Array(uncovered_rows(&aspects)));
            details.insert("raw".into(), raw);
            details.insert("raw_text".into(), Value::String(raw_snippet(&text)));
            return Ok(MetricOutcome::error("Could not parse JSON from model output.", details));
        };

        let rows: Vec<Value> = match obj.get("aspects") {
            Some(Value::Array(judged)) if !judged.is_empty() => aspects
                .iter()
                .enumerate()
                .map(|(i, aspect)| {
                    let rec = judged.get(i).and_then(|r| r.as_object());
                    let covered = rec.map(|r| truthy(r.get("covered"))).unwrap_or(false);
                    let evidence = rec
                        .and_then(|r| r.get("evidence"))
                        .and_then(|e| e.as_str())
                        .map(str::trim)
                        .unwrap_or_default();
                    json!({"aspect": aspect, "covered": covered, "evidence": evidence})
                })
                .collect(),
            _ => uncovered_rows(&aspects),
        };

        let covered = rows.iter().filter(|r| r["covered"] == json!(true)).count();
        let score = covered as f64 / rows.len().max(1) as f64;

        let mut details = Map::new();
        details.insert("per_aspect".into(), Value::Array(rows));
        details.insert("raw".into(), raw);

        Ok(MetricOutcome::structured(
            score,
            format!("Covered {} of {} aspects.", covered, aspects.len()),
            details,
        ))
    }
}
