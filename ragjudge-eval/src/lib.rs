//! # ragjudge eval
//!
//! LLM-as-judge evaluation of RAG outputs: the metric registry, the six
//! judge adapters, manual and agentic orchestration, calibration, and
//! report rendering.

pub mod agentic;
pub mod calibration;
pub mod dataset;
pub mod error;
pub mod manual;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod types;

pub use agentic::AgenticOrchestrator;
pub use calibration::{CalibrationHarness, CalibrationMetric, CalibrationTarget, JudgeSpec};
pub use dataset::{read_jsonl, write_jsonl};
pub use error::{EvalError, MetricError};
pub use manual::{Aggregation, EvaluationAgent};
pub use metrics::{Metric, MetricContext, MetricFamily};
pub use registry::{MetricRegistry, MetricSpec, ProviderFactory, builtin_specs, select_metrics};
pub use report::{ReportBuilder, save_all_formats, save_per_item};
pub use types::{EvalReport, Item, ItemEvaluation, JudgeInput, MetricOutcome, MetricResult};
