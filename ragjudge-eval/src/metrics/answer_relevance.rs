//! Answer relevance: topical alignment of the answer with the question.

use super::judge::{JudgeClient, coerce_score, parse_json_object, raw_snippet, text_field};
use super::{Metric, MetricContext, MetricFamily};
use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use serde_json::{Map, Value, json};

pub const NAME: &str = "answer_relevance";

const SYSTEM_PROMPT: &str =
    "You are a strict evaluation judge. Output ONLY compact JSON per the schema.";

fn user_prompt(question: &str, answer: &str) -> String {
    format!(
        "Metric: answer relevance.\n\
Task: Judge how well the ANSWER addresses the QUESTION.\n\
Focus only on topicality and alignment with the question's intent; \
do not evaluate factual correctness or writing quality.\n\
Scoring guidelines:\n\
  - 0.9-1.0: Directly on-topic and strongly aligned with what the question is asking.\n\
  - 0.7-0.8: Mostly on-topic with minor omissions or small digressions.\n\
  - 0.4-0.6: Partially relevant or too generic.\n\
  - <0.4: Largely off-topic, unhelpful, or answering a different question.\n\
If the question has multiple parts, you may note which parts of the question are not addressed, \
but the score should reflect overall topical relevance, not strict completeness.\n\n\
QUESTION:\n{question}\n\nANSWER:\n{answer}\n\n\
Return compact JSON only, exactly:\n\
{{\"score\": <float 0.0-1.0>, \"missing_parts\": [\"...\"], \"off_topic\": [\"...\"], \"justification\": \"...\"}}"
    )
}

fn list_field(obj: &Map<String, Value>, key: &str) -> Value {
    match obj.get(key) {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        Some(Value::String(s)) if !s.trim().is_empty() => json!([s.trim()]),
        _ => json!([]),
    }
}

pub struct AnswerRelevance {
    judge: JudgeClient,
}

impl AnswerRelevance {
    pub fn new(ctx: &MetricContext) -> Self {
        Self {
            judge: ctx.judge.clone(),
        }
    }
}

#[async_trait]
impl Metric for AnswerRelevance {
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
            .complete_json(SYSTEM_PROMPT, &user_prompt(&input.question, &input.answer), settings)
            .await?;

        let Some(obj) = parse_json_object(&text) else {
            let mut details = Map::new();
            details.insert("missing_parts".into(), json!([]));
            details.insert("off_topic".into(), json!([]));
            details.insert("raw_text".into(), Value::String(raw_snippet(&text)));
            return Ok(MetricOutcome::error("Could not parse JSON from model output.", details));
        };

        let score = coerce_score(obj.get("score"));
        let justification = text_field(&obj, "justification");

        let mut details = Map::new();
        details.insert("missing_parts".into(), list_field(&obj, "missing_parts"));
        details.insert("off_topic".into(), list_field(&obj, "off_topic"));
        details.insert("justification".into(), Value::String(justification.clone()));
        details.insert("raw".into(), Value::Object(obj));

        Ok(MetricOutcome::Structured {
            score,
            explanation: (!justification.is_empty()).then_some(justification),
            details,
        })
    }
}
