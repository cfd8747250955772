//! Error types for the ragjudge-eval crate.

use ragjudge_core::LlmError;
use thiserror::Error;

/// Errors raised at the metric boundary.
///
/// The orchestration layer downgrades every variant into a zero-score
/// result, so none of these stop a batch.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Judge call failed: {0}")]
    Judge(#[from] LlmError),

    #[error("Failed to construct metric {metric}: {message}")]
    Construction { metric: String, message: String },

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Metric not found: {name}")]
    NotFound { name: String },
}

impl MetricError {
    pub fn construction(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            metric: metric.into(),
            message: message.into(),
        }
    }

    pub fn invalid_item(msg: impl Into<String>) -> Self {
        Self::InvalidItem(msg.into())
    }
}

/// Top-level error type for evaluation runs and reporting.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("Invalid record at index {index}: {message}")]
    InvalidRecord { index: usize, message: String },

    #[error("Dataset error at line {line}: {message}")]
    Dataset { line: usize, message: String },

    #[error("No items to evaluate")]
    NoItems,

    #[error("No metrics available")]
    NoMetrics,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),
}
