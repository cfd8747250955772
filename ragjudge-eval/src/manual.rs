//! Manual evaluation agent: a fixed metric set run over every item.

use crate::error::EvalError;
use crate::registry::{MetricRegistry, select_metrics};
use crate::types::{EvalReport, Item, ItemEvaluation, JudgeInput, MetricResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How per-item scores are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean of every metric result.
    #[default]
    Mean,
    /// No per-item aggregate.
    None,
}

/// Runs a fixed set of metrics over a batch of records.
pub struct EvaluationAgent {
    registry: Arc<MetricRegistry>,
    metrics: Vec<String>,
}

impl EvaluationAgent {
    /// Resolve `requested` against the registry; an empty resolution means every metric.
    pub fn new(registry: Arc<MetricRegistry>, requested: &[String]) -> Self {
        let available = registry.names();
        let mut metrics = select_metrics(requested, &available);
        if metrics.is_empty() {
            if !requested.is_empty() {
                warn!(?requested, "No requested metric is registered; using all metrics");
            }
            metrics = available;
        }
        Self { registry, metrics }
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Evaluate every record with the selected metrics.
    pub async fn evaluate_items(
        &self,
        records: &[Value],
        aggregation: Aggregation,
    ) -> Result<EvalReport, EvalError> {
        if self.metrics.is_empty() {
            return Err(EvalError::NoMetrics);
        }
        if records.is_empty() {
            return Err(EvalError::NoItems);
        }
        let items = coerce_records(records)?;

        info!(
            items = items.len(),
            metrics = self.metrics.len(),
            "Starting manual evaluation"
        );
        let mut results = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            debug!(index = i, "Evaluating item");
            results.push(self.evaluate_item(item, &self.metrics, aggregation).await);
        }

        let report = EvalReport::from_results(results);
        info!(metrics = report.summary.len(), "Manual evaluation complete");
        Ok(report)
    }

    /// Run `names` on one item in order; failures become zero-score results.
    pub async fn evaluate_item(
        &self,
        item: &Item,
        names: &[String],
        aggregation: Aggregation,
    ) -> ItemEvaluation {
        let started = Instant::now();
        let input = JudgeInput::from(item);
        let mut metrics = Vec::with_capacity(names.len());

        for name in names {
            let result = match self.registry.evaluate(name, &input).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(metric = %name, error = %e, "Metric failed; recording zero score");
                    MetricResult::failed(name.clone(), e)
                }
            };
            metrics.push(result);
        }

        let mut evaluation = ItemEvaluation {
            item: item.clone(),
            metrics,
            aggregate: None,
            eval_time_sec: 0.0,
        };
        if aggregation == Aggregation::Mean {
            evaluation.aggregate = evaluation.mean_score();
        }
        evaluation.eval_time_sec = started.elapsed().as_secs_f64();
        evaluation
    }
}

/// Coerce raw records into items; a non-object record is an error.
pub fn coerce_records(records: &[Value]) -> Result<Vec<Item>, EvalError> {
    records
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            Item::from_value(raw).map_err(|e| EvalError::InvalidRecord {
                index,
                message: e.to_string(),
            })
        })
        .collect()
}
