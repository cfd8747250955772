//! Agentic orchestrator: per-item metric selection and composite scores.
//!
//! Each record is inspected, a metric set is chosen for it, the chosen
//! metrics run through the manual agent's per-item routine, and the
//! `retrieval_overall` / `answer_overall` composites are appended.

use crate::error::EvalError;
use crate::manual::{Aggregation, EvaluationAgent, coerce_records};
use crate::metrics::{
    answer_completeness, answer_relevance, clarity, retrieval_coverage, retrieval_relevance,
    strict_faithfulness,
};
use crate::registry::MetricRegistry;
use crate::types::{EvalReport, Item, ItemEvaluation, MetricOutcome, MetricResult, SummaryAccumulator};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

pub const RETRIEVAL_OVERALL: &str = "retrieval_overall";
pub const ANSWER_OVERALL: &str = "answer_overall";

const RETRIEVAL_FAMILY: [&str; 2] = [retrieval_relevance::NAME, retrieval_coverage::NAME];
const ANSWER_FAMILY: [&str; 4] = [
    strict_faithfulness::NAME,
    answer_relevance::NAME,
    answer_completeness::NAME,
    clarity::NAME,
];

/// Blend weights for `answer_overall`, renormalised over present components.
pub const ANSWER_WEIGHTS: [(&str, f64); 4] = [
    (strict_faithfulness::NAME, 0.50),
    (answer_relevance::NAME, 0.30),
    (answer_completeness::NAME, 0.15),
    (clarity::NAME, 0.05),
];

/// Whether the question looks like it needs several pieces of evidence.
pub fn looks_multihop(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    q.contains("both") || (q.contains("and") && q.contains(" of ")) || (q.contains("two") && q.contains("sources"))
}

/// A non-blank string, a non-empty list, or any other non-null value.
pub fn has_answer(answer: Option<&Value>) -> bool {
    match answer {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn nonblank_contexts(contexts: Option<&Value>) -> usize {
    match contexts {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|c| !crate::types::value_to_text(c).trim().is_empty())
            .count(),
        _ => 0,
    }
}

/// Choose the metrics to run for one raw record.
///
/// Deterministic and order-preserving; calibration metrics are never chosen.
pub fn choose_metrics(record: &Value, registered: &[String]) -> Vec<String> {
    let is_registered = |name: &&str| registered.iter().any(|r| r == name);
    let retrieval: Vec<&str> = RETRIEVAL_FAMILY.into_iter().filter(is_registered).collect();
    let answerish: Vec<&str> = ANSWER_FAMILY.into_iter().filter(is_registered).collect();

    let question = record
        .get("question")
        .map(crate::types::value_to_text)
        .unwrap_or_default();
    let has_contexts = nonblank_contexts(record.get("contexts")) > 0;

    let mut chosen: Vec<&str> = Vec::new();
    if has_contexts {
        chosen.extend(&retrieval);
    }
    if has_answer(record.get("answer")) {
        chosen.extend(&answerish);
    }
    if looks_multihop(&question)
        && has_contexts
        && is_registered(&retrieval_coverage::NAME)
        && !chosen.contains(&retrieval_coverage::NAME)
    {
        chosen.push(retrieval_coverage::NAME);
    }

    let mut result: Vec<String> = Vec::new();
    for name in chosen {
        if !result.iter().any(|r| r == name) {
            result.push(name.to_string());
        }
    }
    if result.is_empty() && has_contexts {
        result = retrieval.into_iter().map(str::to_string).collect();
    }
    result
}

/// Harmonic mean of two scores; exactly `0.0` when either is zero.
pub fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

/// `retrieval_overall` from whichever retrieval scores are present.
pub fn retrieval_overall(evaluation: &ItemEvaluation) -> Option<MetricResult> {
    let rel = evaluation.metric(retrieval_relevance::NAME).map(|m| m.score);
    let cov = evaluation.metric(retrieval_coverage::NAME).map(|m| m.score);

    let (score, explanation) = match (rel, cov) {
        (None, None) => return None,
        (Some(r), Some(c)) => (
            harmonic_mean(r, c),
            format!("Harmonic mean of relevance ({r:.3}) and coverage ({c:.3})."),
        ),
        (Some(r), None) => (r, "Only relevance available; used as overall.".to_string()),
        (None, Some(c)) => (c, "Only coverage available; used as overall.".to_string()),
    };

    let mut details = Map::new();
    details.insert(
        "components".into(),
        json!({
            "retrieval_relevance": rel,
            "retrieval_coverage": cov,
        }),
    );
    Some(MetricResult::from_outcome(
        RETRIEVAL_OVERALL,
        MetricOutcome::structured(score, explanation, details),
    ))
}

/// `answer_overall`: weighted blend renormalised over the present answer metrics.
pub fn answer_overall(evaluation: &ItemEvaluation) -> Option<MetricResult> {
    let present: Vec<(&str, f64, f64)> = ANSWER_WEIGHTS
        .iter()
        .filter_map(|&(name, weight)| evaluation.metric(name).map(|m| (name, m.score, weight)))
        .collect();
    if present.is_empty() {
        return None;
    }

    let total_weight: f64 = present.iter().map(|(_, _, w)| w).sum();
    let score: f64 = present.iter().map(|(_, s, w)| s * w / total_weight).sum();

    let parts = present
        .iter()
        .map(|(name, s, _)| format!("{name}={s:.3}"))
        .collect::<Vec<_>>()
        .join(", ");
    let components: Map<String, Value> = present
        .iter()
        .map(|(name, s, _)| (name.to_string(), json!(s)))
        .collect();
    let weights: Map<String, Value> = present
        .iter()
        .map(|(name, _, w)| (name.to_string(), json!(w / total_weight)))
        .collect();

    let mut details = Map::new();
    details.insert("components".into(), Value::Object(components));
    details.insert("weights_renormed".into(), Value::Object(weights));
    Some(MetricResult::from_outcome(
        ANSWER_OVERALL,
        MetricOutcome::structured(
            score,
            format!("Weighted blend over available metrics ({parts})."),
            details,
        ),
    ))
}

/// Per-item adaptive evaluation.
pub struct AgenticOrchestrator {
    agent: EvaluationAgent,
}

impl AgenticOrchestrator {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            agent: EvaluationAgent::new(registry, &[]),
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.agent.registry()
    }

    /// Evaluate every record with its own metric selection.
    pub async fn run(&self, records: &[Value]) -> Result<EvalReport, EvalError> {
        if records.is_empty() {
            return Err(EvalError::NoItems);
        }
        let items = coerce_records(records)?;
        let registered = self.registry().names();
        info!(items = items.len(), "Starting agentic evaluation");

        let mut summary = SummaryAccumulator::default();
        let mut results = Vec::with_capacity(items.len());
        for (index, (record, item)) in records.iter().zip(items).enumerate() {
            let evaluation = self.evaluate_record(record, item, &registered).await;
            debug!(
                index,
                metrics = evaluation.metrics.len(),
                "Agentic item evaluated"
            );
            summary.add(&evaluation);
            results.push(evaluation);
        }

        Ok(EvalReport {
            results,
            summary: summary.finish(),
        })
    }

    async fn evaluate_record(&self, record: &Value, item: Item, registered: &[String]) -> ItemEvaluation {
        let chosen = choose_metrics(record, registered);
        if chosen.is_empty() {
            debug!("Nothing applicable; recording empty shell");
            return ItemEvaluation {
                item,
                metrics: Vec::new(),
                aggregate: Some(0.0),
                eval_time_sec: 0.0,
            };
        }

        let mut evaluation = self.agent.evaluate_item(&item, &chosen, Aggregation::Mean).await;
        let composites: Vec<MetricResult> = [retrieval_overall(&evaluation), answer_overall(&evaluation)]
            .into_iter()
            .flatten()
            .collect();
        evaluation.metrics.extend(composites);
        evaluation
    }
}
