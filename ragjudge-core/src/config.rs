//! Configuration system for ragjudge.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config -> environment variables -> explicit overrides.
//!
//! Judge settings for an individual metric call are resolved separately by
//! [`RagJudgeConfig::judge_settings_for`], which also honours the per-metric
//! environment variables (`FAITHFULNESS_MODEL`, `CLARITY_TEMPERATURE`, ...).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default judge model.
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";

/// Default relevance threshold for `retrieval_relevance`.
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.7;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagJudgeConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    /// Per-metric judge overrides keyed by metric name (or `aspects`).
    #[serde(default)]
    pub judges: BTreeMap<String, JudgeOverride>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Judge LLM endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only OpenAI-compatible endpoints are supported.
    pub provider: String,
    /// Default judge model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Literal API key, taking precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override. Falls back to `OPENAI_BASE_URL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens the judge may generate per call.
    pub max_tokens: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: DEFAULT_JUDGE_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 2048,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// The configured base URL, else `OPENAI_BASE_URL`, else `None`.
    pub fn effective_base_url(&self) -> Option<String> {
        self.base_url.clone().or_else(|| {
            std::env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
    }
}

/// Retry policy for transient judge failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Model and temperature override for one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeOverride {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Metric discovery and scoring options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metric names never registered.
    #[serde(default)]
    pub denylist: Vec<String>,
    /// Chunk relevance threshold. Falls back to `RETRIEVAL_RELEVANCE_THRESHOLD`.
    #[serde(default)]
    pub retrieval_relevance_threshold: Option<f64>,
    /// Register the `calibration_*` metrics.
    #[serde(default = "default_true")]
    pub include_calibration: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            denylist: Vec::new(),
            retrieval_relevance_threshold: None,
            include_calibration: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl MetricsConfig {
    /// Resolved relevance threshold, clamped into `[0, 1]`.
    pub fn relevance_threshold(&self) -> f64 {
        self.relevance_threshold_with(|k| std::env::var(k).ok())
    }

    pub fn relevance_threshold_with(&self, env: impl Fn(&str) -> Option<String>) -> f64 {
        let raw = self.retrieval_relevance_threshold.or_else(|| {
            env("RETRIEVAL_RELEVANCE_THRESHOLD").and_then(|v| v.trim().parse::<f64>().ok())
        });
        match raw {
            Some(t) if t.is_finite() => t.clamp(0.0, 1.0),
            _ => DEFAULT_RELEVANCE_THRESHOLD,
        }
    }
}

/// One calibration judge as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSpecConfig {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
}

/// Calibration judge list overrides keyed by target metric name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub judges: BTreeMap<String, Vec<JudgeSpecConfig>>,
}

/// Model and temperature used for a single judge call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSettings {
    pub model: String,
    pub temperature: f32,
}

impl JudgeSettings {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self::new(DEFAULT_JUDGE_MODEL, 0.0)
    }
}

/// Environment variable prefix historically used for a metric's judge.
pub fn legacy_env_prefix(metric: &str) -> Option<&'static str> {
    match metric {
        "strict_faithfulness" => Some("FAITHFULNESS"),
        "answer_completeness" => Some("ANSWER_COMPLETENESS"),
        "answer_relevance" => Some("ANSWER_RELEVANCE"),
        "clarity" => Some("CLARITY"),
        "retrieval_coverage" => Some("RETRIEVAL_COVERAGE"),
        "retrieval_relevance" => Some("RETRIEVAL_RELEVANCE"),
        "aspects" => Some("ASPECTS"),
        _ => None,
    }
}

impl RagJudgeConfig {
    /// Resolve the judge settings for `metric` against the process environment.
    pub fn judge_settings_for(&self, metric: &str) -> JudgeSettings {
        self.judge_settings_with(metric, |k| std::env::var(k).ok())
    }

    /// Resolve the judge settings for `metric` using `env` as the variable source.
    ///
    /// Each field resolves independently: `judges.<metric>`, then
    /// `<PREFIX>_MODEL` / `<PREFIX>_TEMPERATURE`, then `llm.model` at 0.0.
    pub fn judge_settings_with(
        &self,
        metric: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> JudgeSettings {
        let explicit = self.explicit_override_with(metric, env);
        JudgeSettings {
            model: explicit.model.unwrap_or_else(|| self.llm.model.clone()),
            temperature: explicit.temperature.unwrap_or(0.0),
        }
    }

    /// Settings for aspect extraction set by `judges.aspects` or
    /// `ASPECTS_MODEL` / `ASPECTS_TEMPERATURE`. Unset fields stay `None`.
    pub fn aspect_override(&self) -> JudgeOverride {
        self.explicit_override_with("aspects", |k| std::env::var(k).ok())
    }

    /// Fields set for `metric` by config or its legacy variables, without defaults.
    pub fn explicit_override_with(
        &self,
        metric: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> JudgeOverride {
        let over = self.judges.get(metric);
        let prefix = legacy_env_prefix(metric);
        let lookup = |suffix: &str| {
            prefix
                .and_then(|p| env(&format!("{p}_{suffix}")))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let model = over
            .and_then(|o| o.model.clone())
            .or_else(|| lookup("MODEL"));
        let temperature = over
            .and_then(|o| o.temperature)
            .or_else(|| lookup("TEMPERATURE").and_then(|v| v.parse::<f32>().ok()))
            .filter(|t| t.is_finite());

        JudgeOverride { model, temperature }
    }
}

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "ragjudge";
const APPLICATION: &str = "ragjudge";

/// Platform project directories for ragjudge.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Load configuration by merging layers in priority order (highest last):
/// 1. Built-in defaults
/// 2. User config (`~/.config/ragjudge/config.toml`)
/// 3. Workspace-local config (`.ragjudge/config.toml`)
/// 4. Environment variables (prefixed with `RAGJUDGE_`)
/// 5. Explicit overrides (passed as argument)
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RagJudgeConfig>,
) -> Result<RagJudgeConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(RagJudgeConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".ragjudge").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RAGJUDGE_LLM__MODEL, RAGJUDGE_METRICS__INCLUDE_CALIBRATION, etc.
    figment = figment.merge(Env::prefixed("RAGJUDGE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    Ok(figment.extract()?)
}

/// Check whether any ragjudge configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs()
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }

    workspace.is_some_and(|ws| ws.join(".ragjudge").join("config.toml").exists())
}
