//! Judge-backed metrics.
//!
//! Every metric implements [`Metric`]. Adapters build a prompt from a
//! [`JudgeInput`], ask the judge for a JSON object and normalise whatever
//! comes back into a [`MetricOutcome`]. Judge transport failures are
//! returned as `Err` and left to the orchestration layer to downgrade.

pub mod answer_completeness;
pub mod answer_relevance;
pub mod aspects;
pub mod clarity;
pub mod judge;
pub mod retrieval_coverage;
pub mod retrieval_relevance;
pub mod strict_faithfulness;

use crate::error::MetricError;
use crate::types::{JudgeInput, MetricOutcome};
use async_trait::async_trait;
use ragjudge_core::{JudgeSettings, LlmProvider, RagJudgeConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use judge::JudgeClient;

/// Names of the six judge-backed base metrics, in registration order.
pub const BASE_METRICS: [&str; 6] = [
    strict_faithfulness::NAME,
    answer_completeness::NAME,
    answer_relevance::NAME,
    clarity::NAME,
    retrieval_coverage::NAME,
    retrieval_relevance::NAME,
];

/// What part of a RAG pipeline a metric judges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Retrieval,
    Answer,
    Calibration,
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricFamily::Retrieval => write!(f, "retrieval"),
            MetricFamily::Answer => write!(f, "answer"),
            MetricFamily::Calibration => write!(f, "calibration"),
        }
    }
}

/// Trait that all metrics must implement.
#[async_trait]
pub trait Metric: Send + Sync {
    /// The unique registry name of this metric.
    fn name(&self) -> &str;

    fn family(&self) -> MetricFamily;

    /// Score one input with the given judge settings.
    async fn evaluate(
        &self,
        input: &JudgeInput,
        settings: &JudgeSettings,
    ) -> Result<MetricOutcome, MetricError>;
}

/// Everything a metric needs at construction time.
#[derive(Clone)]
pub struct MetricContext {
    pub judge: JudgeClient,
    pub config: Arc<RagJudgeConfig>,
}

impl MetricContext {
    pub fn new(provider: Arc<dyn LlmProvider>, config: Arc<RagJudgeConfig>) -> Self {
        Self {
            judge: JudgeClient::new(provider),
            config,
        }
    }

    /// Context over `provider` with default configuration.
    pub fn for_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, Arc::new(RagJudgeConfig::default()))
    }
}

/// Build one of the base adapters by name.
pub fn build_adapter(name: &str, ctx: &MetricContext) -> Result<Arc<dyn Metric>, MetricError> {
    let metric: Arc<dyn Metric> = match name {
        strict_faithfulness::NAME => Arc::new(strict_faithfulness::StrictFaithfulness::new(ctx)),
        answer_completeness::NAME => Arc::new(answer_completeness::AnswerCompleteness::new(ctx)),
        answer_relevance::NAME => Arc::new(answer_relevance::AnswerRelevance::new(ctx)),
        clarity::NAME => Arc::new(clarity::Clarity::new(ctx)),
        retrieval_coverage::NAME => Arc::new(retrieval_coverage::RetrievalCoverage::new(ctx)),
        retrieval_relevance::NAME => Arc::new(retrieval_relevance::RetrievalRelevance::new(ctx)),
        other => {
            return Err(MetricError::NotFound {
                name: other.to_string(),
            });
        }
    };
    Ok(metric)
}
