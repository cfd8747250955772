//! Calibration harness: replay one metric under several judges and measure agreement.
//!
//! Each judge is a named `(model, temperature)` pair handed to the target
//! metric as explicit [`JudgeSettings`]. Nothing global is touched, so a
//! calibration run leaves the process environment exactly as it found it.

use crate::error::MetricError;
use crate::metrics::{Metric, MetricContext, MetricFamily, build_adapter};
use crate::types::{JudgeInput, MetricOutcome, MetricResult};
use async_trait::async_trait;
use ragjudge_core::JudgeSettings;
use ragjudge_core::RagJudgeConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of calibration metric names.
pub const CALIBRATION_PREFIX: &str = "calibration_";

/// Targets registered as calibration metrics by default.
pub const REGISTERED_TARGETS: [&str; 3] = [
    "strict_faithfulness",
    "answer_completeness",
    "retrieval_coverage",
];

/// One calibration judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSpec {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
}

impl JudgeSpec {
    pub fn new(name: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            temperature,
        }
    }

    pub fn settings(&self) -> JudgeSettings {
        JudgeSettings::new(self.model.clone(), self.temperature)
    }
}

/// The metric to calibrate and the judges to replay it under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub metric_name: String,
    pub judges: Vec<JudgeSpec>,
}

/// Judge-name prefix for a calibration target.
pub fn judge_prefix(metric: &str) -> Option<&'static str> {
    match metric {
        "strict_faithfulness" => Some("sf"),
        "answer_completeness" => Some("ac"),
        "answer_relevance" => Some("ar"),
        "clarity" => Some("cl"),
        "retrieval_coverage" => Some("rc"),
        "retrieval_relevance" => Some("rr"),
        _ => None,
    }
}

impl CalibrationTarget {
    /// The built-in six-judge panel for a base metric.
    pub fn default_for(metric: &str) -> Option<Self> {
        let p = judge_prefix(metric)?;
        Some(Self {
            metric_name: metric.to_string(),
            judges: vec![
                JudgeSpec::new(format!("{p}_gpt4omini_t00_run1"), "gpt-4o-mini", 0.0),
                JudgeSpec::new(format!("{p}_gpt4omini_t00_run2"), "gpt-4o-mini", 0.0),
                JudgeSpec::new(format!("{p}_gpt4omini_t20"), "gpt-4o-mini", 0.2),
                JudgeSpec::new(format!("{p}_gpt4omini_t50"), "gpt-4o-mini", 0.5),
                JudgeSpec::new(format!("{p}_gpt41mini_t00"), "gpt-4.1-mini", 0.0),
                JudgeSpec::new(format!("{p}_gpt41mini_t30"), "gpt-4.1-mini", 0.3),
            ],
        })
    }

    /// The configured judge panel for `metric`, falling back to the built-in one.
    pub fn resolve(metric: &str, config: &RagJudgeConfig) -> Option<Self> {
        match config.calibration.judges.get(metric) {
            Some(judges) if !judges.is_empty() => Some(Self {
                metric_name: metric.to_string(),
                judges: judges
                    .iter()
                    .map(|j| JudgeSpec::new(j.name.clone(), j.model.clone(), j.temperature))
                    .collect(),
            }),
            _ => Self::default_for(metric),
        }
    }

    pub fn result_name(&self) -> String {
        format!("{CALIBRATION_PREFIX}{}", self.metric_name)
    }
}

/// Replays metrics under calibration judges.
pub struct CalibrationHarness {
    ctx: MetricContext,
}

impl CalibrationHarness {
    pub fn new(ctx: MetricContext) -> Self {
        Self { ctx }
    }

    /// Calibrate the target's metric on one input.
    pub async fn run(
        &self,
        input: &JudgeInput,
        target: &CalibrationTarget,
    ) -> Result<MetricResult, MetricError> {
        let metric = build_adapter(&target.metric_name, &self.ctx)?;
        Ok(run_with_metric(metric.as_ref(), input, target).await)
    }
}

/// Replay `metric` under every judge of `target` and summarise the spread.
pub async fn run_with_metric(
    metric: &dyn Metric,
    input: &JudgeInput,
    target: &CalibrationTarget,
) -> MetricResult {
    let metric_name = target.metric_name.as_str();
    let mut sub_scores = Map::new();
    let mut judge_outputs = Map::new();
    let mut errors = Map::new();
    let mut scores = Vec::with_capacity(target.judges.len());

    for judge in &target.judges {
        match metric.evaluate(input, &judge.settings()).await {
            Ok(outcome) => {
                let result = MetricResult::from_outcome(metric_name, outcome);
                debug!(judge = %judge.name, score = result.score, "Calibration judge scored");
                scores.push(result.score);
                sub_scores.insert(judge.name.clone(), json!(result.score));
                judge_outputs.insert(
                    judge.name.clone(),
                    json!({
                        "score": result.score,
                        "explanation": result.explanation.unwrap_or_default(),
                        "raw": result.details,
                    }),
                );
            }
            Err(e) => {
                warn!(judge = %judge.name, error = %e, "Calibration judge failed");
                errors.insert(judge.name.clone(), Value::String(e.to_string()));
            }
        }
    }

    let mut details = Map::new();
    details.insert("metric_name".into(), json!(metric_name));

    let Some(stats) = AgreementStats::from_scores(&scores) else {
        details.insert("sub_scores".into(), json!({}));
        details.insert("judge_outputs".into(), json!({}));
        details.insert("min".into(), json!(0.0));
        details.insert("max".into(), json!(0.0));
        details.insert("spread".into(), json!(1.0));
        details.insert("confidence".into(), json!(0.0));
        details.insert("errors".into(), Value::Object(errors));
        return MetricResult::from_outcome(
            target.result_name(),
            MetricOutcome::structured(
                0.0,
                format!("Calibration failed for {metric_name}; no valid scores"),
                details,
            ),
        );
    };

    let explanation = format!(
        "Calibration for {metric_name}: {} judges, range [{:.2}, {:.2}], spread={:.2}, agreement={:.2}.",
        scores.len(),
        stats.min,
        stats.max,
        stats.spread,
        stats.agreement
    );
    details.insert("sub_scores".into(), Value::Object(sub_scores));
    details.insert("judge_outputs".into(), Value::Object(judge_outputs));
    details.insert("min".into(), json!(stats.min));
    details.insert("max".into(), json!(stats.max));
    details.insert("spread".into(), json!(stats.spread));
    details.insert("confidence".into(), json!(stats.agreement));
    details.insert("errors".into(), Value::Object(errors));

    MetricResult::from_outcome(
        target.result_name(),
        MetricOutcome::structured(stats.agreement, explanation, details),
    )
}

/// Spread statistics over the judges that produced a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgreementStats {
    pub min: f64,
    pub max: f64,
    pub spread: f64,
    pub agreement: f64,
}

impl AgreementStats {
    /// `None` when no judge produced a score.
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let min = scores.iter().copied().reduce(f64::min)?;
        let max = scores.iter().copied().reduce(f64::max)?;
        let spread = max - min;
        Some(Self {
            min,
            max,
            spread,
            agreement: (1.0 - spread).max(0.0),
        })
    }
}

/// A calibration run exposed as a registry metric.
pub struct CalibrationMetric {
    name: String,
    target: CalibrationTarget,
    inner: Arc<dyn Metric>,
}

impl CalibrationMetric {
    pub fn new(target: CalibrationTarget, inner: Arc<dyn Metric>) -> Self {
        Self {
            name: target.result_name(),
            target,
            inner,
        }
    }

    /// Build the calibration metric for a base metric, honouring configured judges.
    pub fn for_target(metric: &str, ctx: &MetricContext) -> Result<Self, MetricError> {
        let target = CalibrationTarget::resolve(metric, &ctx.config).ok_or_else(|| {
            MetricError::construction(
                format!("{CALIBRATION_PREFIX}{metric}"),
                format!("no calibration target for '{metric}'"),
            )
        })?;
        let inner = build_adapter(metric, ctx)?;
        Ok(Self::new(target, inner))
    }

    pub fn target(&self) -> &CalibrationTarget {
        &self.target
    }
}

#[async_trait]
impl Metric for CalibrationMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Calibration
    }

    /// Judges carry their own settings; the caller's settings are ignored.
    async fn evaluate(
        &self,
        input: &JudgeInput,
        _settings: &JudgeSettings,
    ) -> Result<MetricOutcome, MetricError> {
        let result = run_with_metric(self.inner.as_ref(), input, &self.target).await;
        Ok(MetricOutcome::Structured {
            score: result.score,
            explanation: result.explanation,
            details: result.details,
        })
    }
}
