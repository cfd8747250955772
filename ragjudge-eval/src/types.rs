//! Evaluation data model: items, judge inputs, metric results and reports.

use crate::error::MetricError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One question/answer/contexts record under evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspects: Option<Vec<String>>,
}

impl Item {
    /// Build an item from a raw input record.
    ///
    /// Absent fields default to empty. Non-string answers are rendered as
    /// text: numbers and booleans via JSON, lists joined by newlines.
    pub fn from_value(value: &Value) -> Result<Self, MetricError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MetricError::invalid_item(format!("expected a JSON object, got {}", kind(value))))?;

        let question = obj.get("question").map(value_to_text).unwrap_or_default();
        let answer = obj.get("answer").map(value_to_text).unwrap_or_default();
        let contexts = obj.get("contexts").map(value_to_list).unwrap_or_default();
        let metadata = obj
            .get("metadata")
            .and_then(|m| m.as_object())
            .cloned()
            .unwrap_or_default();
        let aspects = obj
            .get("aspects")
            .filter(|a| !a.is_null())
            .map(value_to_list);

        Ok(Self {
            question,
            answer,
            contexts,
            metadata,
            aspects,
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render any JSON value as plain text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(value_to_text)
            .collect(),
        other => vec![value_to_text(other)],
    }
}

/// The adapter view of an item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JudgeInput {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub aspects: Option<Vec<String>>,
}

impl JudgeInput {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, contexts: Vec<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            contexts,
            aspects: None,
        }
    }

    pub fn with_aspects(mut self, aspects: Vec<String>) -> Self {
        self.aspects = Some(aspects);
        self
    }
}

impl From<&Item> for JudgeInput {
    fn from(item: &Item) -> Self {
        Self {
            question: item.question.clone(),
            answer: item.answer.clone(),
            contexts: item.contexts.clone(),
            aspects: item.aspects.clone(),
        }
    }
}

/// What a metric produced before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    /// A bare score.
    Numeric(f64),
    /// A score with explanation and structured details.
    Structured {
        score: f64,
        explanation: Option<String>,
        details: Map<String, Value>,
    },
    /// The judge answered but the answer was unusable.
    Error {
        message: String,
        details: Map<String, Value>,
    },
}

impl MetricOutcome {
    pub fn structured(score: f64, explanation: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::Structured {
            score,
            explanation: Some(explanation.into()),
            details,
        }
    }

    pub fn error(message: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}

/// Clamp a score into `[0, 1]`; NaN becomes `0.0`.
pub fn clip01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// A normalised metric result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl MetricResult {
    /// Normalise a metric outcome under `name`.
    pub fn from_outcome(name: impl Into<String>, outcome: MetricOutcome) -> Self {
        let name = name.into();
        match outcome {
            MetricOutcome::Numeric(score) => Self {
                name,
                score: clip01(score),
                explanation: None,
                details: Map::new(),
            },
            MetricOutcome::Structured {
                score,
                explanation,
                details,
            } => Self {
                name,
                score: clip01(score),
                explanation,
                details,
            },
            MetricOutcome::Error {
                message,
                mut details,
            } => {
                details.insert("error".into(), Value::String(message));
                Self {
                    name,
                    score: 0.0,
                    explanation: None,
                    details,
                }
            }
        }
    }

    /// Zero-score result carrying the error text in `details.error`.
    pub fn failed(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let mut details = Map::new();
        details.insert("error".into(), Value::String(error.to_string()));
        Self {
            name: name.into(),
            score: 0.0,
            explanation: None,
            details,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.details.get("error").and_then(|e| e.as_str())
    }
}

/// All metric results for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEvaluation {
    pub item: Item,
    pub metrics: Vec<MetricResult>,
    pub aggregate: Option<f64>,
    #[serde(default)]
    pub eval_time_sec: f64,
}

impl ItemEvaluation {
    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Arithmetic mean of every recorded score, `None` when nothing ran.
    pub fn mean_score(&self) -> Option<f64> {
        if self.metrics.is_empty() {
            return None;
        }
        let sum: f64 = self.metrics.iter().map(|m| m.score).sum();
        Some(sum / self.metrics.len() as f64)
    }
}

/// A batch evaluation report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalReport {
    pub results: Vec<ItemEvaluation>,
    pub summary: BTreeMap<String, f64>,
}

impl EvalReport {
    /// Build a report, summarising each metric over the items that ran it.
    pub fn from_results(results: Vec<ItemEvaluation>) -> Self {
        let mut acc = SummaryAccumulator::default();
        for r in &results {
            acc.add(r);
        }
        Self {
            results,
            summary: acc.finish(),
        }
    }
}

/// Running per-metric sum and count.
#[derive(Debug, Default)]
pub struct SummaryAccumulator {
    totals: BTreeMap<String, (f64, usize)>,
}

impl SummaryAccumulator {
    pub fn add(&mut self, evaluation: &ItemEvaluation) {
        for m in &evaluation.metrics {
            let entry = self.totals.entry(m.name.clone()).or_insert((0.0, 0));
            entry.0 += m.score;
            entry.1 += 1;
        }
    }

    pub fn finish(self) -> BTreeMap<String, f64> {
        self.totals
            .into_iter()
            .map(|(name, (sum, count))| {
                let mean = if count == 0 { 0.0 } else { sum / count as f64 };
                (name, mean)
            })
            .collect()
    }
}
