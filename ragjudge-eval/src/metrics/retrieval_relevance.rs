//! Retrieval relevance: precision-like share of retrieved chunks relevant to the question.

use super::judge::{JudgeClient, coerce_score, parse_json_object, raw_snippet};
use super::retrieval_coverage::numbered_documents;
use super::{Metric, MetricContext, MetricFamily};
use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use serde_json::{Map, Value, json};

pub const NAME: &str = "retrieval_relevance";

const SYSTEM_PROMPT: &str = "You are a retrieval relevance judge.\n\
For each document, assign a relevance score in [0,1] **to the QUESTION**.\n\
Guidelines:\n \
• 1.0 = directly answers or contains key facts to answer the question\n \
• 0.7-0.9 = highly useful but not the final answer by itself\n \
• 0.3-0.6 = weakly related or background\n \
• 0.0-0.2 = irrelevant\n\
Give a terse reason per document.\n\
Return ONLY JSON:\n\
{\n  \
\"per_chunk\": [\n    \
{ \"chunk_id\": <int>, \"relevance\": <float 0..1>, \"reason\": \"<short>\" },\n    \
...\n  \
]\n\
}\n";

fn user_prompt(question: &str, contexts: &[String]) -> String {
    format!(
        "QUESTION:\n{question}\n\nDOCUMENTS:\n{}\n\nReturn JSON only.",
        numbered_documents(contexts)
    )
}

fn irrelevant_rows(count: usize) -> Vec<Value> {
    (1..=count)
        .map(|id| json!({"chunk_id": id, "relevance": 0.0, "reason": ""}))
        .collect()
}

pub struct RetrievalRelevance {
    judge: JudgeClient,
    threshold: f64,
}

impl RetrievalRelevance {
    pub fn new(ctx: &MetricContext) -> Self {
        Self {
            judge: ctx.judge.clone(),
            threshold: ctx.config.metrics.relevance_threshold(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[async_trait]
impl Metric for RetrievalRelevance {
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
        let thr = self.threshold;
        if input.contexts.is_empty() {
            let mut details = Map::new();
            details.insert("per_chunk".into(), json!([]));
            details.insert(
                "raw".into(),
                json!({"question": input.question, "contexts_count": 0}),
            );
            return Ok(MetricOutcome::structured(
                0.0,
                "No retrieved contexts provided.",
                details,
            ));
        }

        let raw = json!({
            "question": input.question,
            "threshold": thr,
            "contexts_count": input.contexts.len(),
            "model": settings.model,
        });

        let text = self
            .judge
            .complete_json(SYSTEM_PROMPT, &user_prompt(&input.question, &input.contexts), settings)
            .await?;

        let Some(obj) = parse_json_object(&text) else {
            let mut details = Map::new();
            details.insert("per_chunk".into(), Value::Array(irrelevant_rows(input.contexts.len())));
            details.insert("raw".into(), raw);
            details.insert("raw_text".into(), Value::String(raw_snippet(&text)));
            return Ok(MetricOutcome::error("Could not parse JSON from model output.", details));
        };

        // Rows are aligned by index and clamped to the number of supplied contexts.
        let per_chunk: Vec<Value> = match obj.get("per_chunk") {
            Some(Value::Array(judged)) if !judged.is_empty() => (0..input.contexts.len())
                .map(|i| {
                    let rec = judged.get(i).and_then(|r| r.as_object());
                    let relevance = coerce_score(rec.and_then(|r| r.get("relevance")));
                    let reason = rec
                        .and_then(|r| r.get("reason"))
                        .and_then(|r| r.as_str())
                        .map(str::trim)
                        .unwrap_or_default();
                    json!({"chunk_id": i + 1, "relevance": relevance, "reason": reason})
                })
                .collect(),
            _ => irrelevant_rows(input.contexts.len()),
        };

        let relevant = per_chunk
            .iter()
            .filter(|c| c["relevance"].as_f64().unwrap_or(0.0) >= thr)
            .count();
        let score = relevant as f64 / per_chunk.len().max(1) as f64;

        let mut details = Map::new();
        details.insert("per_chunk".into(), Value::Array(per_chunk));
        details.insert("raw".into(), raw);

        Ok(MetricOutcome::structured(
            score,
            format!("{relevant} of {} chunks ≥ {thr:.2} relevance.", input.contexts.len()),
            details,
        ))
    }
}
