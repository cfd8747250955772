//! Strict faithfulness: share of answer claims grounded in the contexts.

use super::judge::{JudgeClient, normalize_ws, parse_json_object, raw_snippet, text_field};
use super::{Metric, MetricContext, MetricFamily};
use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const NAME: &str = "strict_faithfulness";

const SYSTEM_PROMPT: &str = "You are a strict factual evaluation agent. \
Determine exactly which parts of the ANSWER are grounded in the CONTEXTS. \
Do not assume correctness unless it matches the context explicitly. \
Return valid JSON only.";

fn user_prompt(answer: &str, contexts: &[String]) -> String {
    let context_text = contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a professional fact-checking judge.\n\
Your goal: determine whether each factual claim in the ANSWER is directly supported by the CONTEXTS.\n\n\
You MUST do everything in ONE step:\n\
1. Extract factual claims ONLY from the literal content of the ANSWER:\n\
   - Use the ANSWER exactly as written.\n\
   - Do NOT add, infer, expand, or reconstruct new claims.\n\
   - Every claim you evaluate must be explicitly present in the ANSWER text.\n\n\
2. Split the ANSWER into short, atomic factual claims.\n\
   - Do NOT split names or compound phrases unnaturally. Split only at sentence-level or clear independent factual units.\n\
   - Do NOT merge independent facts.\n\
   - Do NOT generate comparative, causal, or inferred statements that are not literally in the ANSWER.\n\n\
3. For each claim, check if it is supported by any of the provided CONTEXTS using STRICT rules:\n\
   - Carefully read the entire set of CONTEXTS.\n\
   - Entities (people, places, organizations) must appear with the same meaning/spelling (case/spacing differences are ok).\n\
   - Temporal info (years, dates) must match exactly.\n\
   - If a sentence or phrase from the ANSWER appears verbatim or almost verbatim in the CONTEXTS, you MUST mark that claim as supported.\n\
   - Support must come ONLY from the CONTEXTS.\n\
   - If the context does not explicitly support a claim, or contradicts it, mark it as hallucinated.\n\n\
4. Classify each claim into:\n\
   - \"supported\": fully supported by the context.\n\
   - \"partial_hallucination\": some parts supported but at least one factual element unsupported.\n\
   - \"full_hallucination\": not supported at all or contradicts the context.\n\n\
5. Compute strict_faithfulness = (# supported claims) / (total number of claims).\n\n\
6. Return JSON ONLY in this exact format:\n\
{{\n\
  \"strict_faithfulness\": <float>,\n\
  \"supported_claims\": [{{\"claim\": \"...\", \"supported_by\": \"<context snippet>\"}}],\n\
  \"hallucinated_claims\": [{{\"claim\": \"...\", \"type\": \"partial_hallucination\" | \"full_hallucination\", \"reason\": \"...\", \"evidence\": \"<context snippet or empty>\"}}],\n\
  \"explanation\": \"short 1-3 sentence summary\"\n\
}}\n\n\
ANSWER:\n{answer}\n\n\
CONTEXTS (retrieved evidences):\n{context_text}\n\n\
Respond strictly in JSON only."
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedClaim {
    pub claim: String,
    pub supported_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinatedClaim {
    pub claim: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub evidence: String,
}

pub struct StrictFaithfulness {
    judge: JudgeClient,
}

impl StrictFaithfulness {
    pub fn new(ctx: &MetricContext) -> Self {
        Self {
            judge: ctx.judge.clone(),
        }
    }
}

fn supported_claims(obj: &Map<String, Value>) -> Vec<SupportedClaim> {
    let Some(Value::Array(entries)) = obj.get("supported_claims") else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|e| match e {
            Value::Object(o) => Some(SupportedClaim {
                claim: text_field(o, "claim"),
                supported_by: text_field(o, "supported_by"),
            }),
            Value::String(s) => Some(SupportedClaim {
                claim: s.clone(),
                supported_by: String::new(),
            }),
            _ => None,
        })
        .collect()
}

fn hallucinated_claims(obj: &Map<String, Value>) -> Vec<HallucinatedClaim> {
    let Some(Value::Array(entries)) = obj.get("hallucinated_claims") else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|e| match e {
            Value::Object(o) => {
                let kind = text_field(o, "type");
                Some(HallucinatedClaim {
                    claim: text_field(o, "claim"),
                    kind: if kind.is_empty() {
                        "full_hallucination".into()
                    } else {
                        kind
                    },
                    reason: text_field(o, "reason"),
                    evidence: text_field(o, "evidence"),
                })
            }
            Value::String(s) => Some(HallucinatedClaim {
                claim: s.clone(),
                kind: "full_hallucination".into(),
                reason: String::new(),
                evidence: String::new(),
            }),
            _ => None,
        })
        .collect()
}

/// Move hallucinated claims that literally occur in the contexts to supported.
pub fn apply_literal_match(
    contexts: &[String],
    mut supported: Vec<SupportedClaim>,
    hallucinated: Vec<HallucinatedClaim>,
) -> (Vec<SupportedClaim>, Vec<HallucinatedClaim>) {
    let haystack = contexts
        .iter()
        .map(|c| normalize_ws(&c.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ");

    let mut remaining = Vec::new();
    for h in hallucinated {
        let needle = normalize_ws(&h.claim.to_lowercase());
        if !needle.is_empty() && haystack.contains(&needle) {
            supported.push(SupportedClaim {
                claim: h.claim,
                supported_by: "literal-match".into(),
            });
        } else {
            remaining.push(h);
        }
    }
    (supported, remaining)
}

#[async_trait]
impl Metric for StrictFaithfulness {
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
            .complete_json(SYSTEM_PROMPT, &user_prompt(&input.answer, &input.contexts), settings)
            .await?;

        let obj = match parse_json_object(&text) {
            Some(obj) if obj.contains_key("strict_faithfulness") || obj.contains_key("supported_claims") => obj,
            _ => {
                let mut details = Map::new();
                details.insert("supported_claims".into(), json!([]));
                details.insert("hallucinated_claims".into(), json!([]));
                details.insert("raw_text".into(), Value::String(raw_snippet(&text)));
                return Ok(MetricOutcome::error(
                    "Could not parse JSON from model output.",
                    details,
                ));
            }
        };

        let (supported, hallucinated) =
            apply_literal_match(&input.contexts, supported_claims(&obj), hallucinated_claims(&obj));

        let total = (supported.len() + hallucinated.len()).max(1);
        let score = supported.len() as f64 / total as f64;
        let partial = hallucinated
            .iter()
            .filter(|h| h.kind == "partial_hallucination")
            .count();
        let full = hallucinated
            .iter()
            .filter(|h| h.kind == "full_hallucination")
            .count();

        let explanation = format!(
            "{} of {} claims supported; {} partial and {} full hallucinations.",
            supported.len(),
            total,
            partial,
            full
        );

        let mut details = Map::new();
        details.insert("supported_claims".into(), serde_json::to_value(&supported).unwrap_or_default());
        details.insert(
            "hallucinated_claims".into(),
            serde_json::to_value(&hallucinated).unwrap_or_default(),
        );
        details.insert(
            "raw".into(),
            json!({
                "summary": {
                    "strict_faithfulness": obj.get("strict_faithfulness").cloned().unwrap_or(Value::Null),
                    "explanation": text_field(&obj, "explanation"),
                }
            }),
        );

        Ok(MetricOutcome::structured(score, explanation, details))
    }
}
