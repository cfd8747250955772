//! Metric Registry — static registration table, discovery, and lazy construction.
//!
//! Discovery walks an enumerated list of [`MetricSpec`]s. Accepted specs are
//! registered as lazy factories: neither the judge provider (which needs an
//! API credential) nor the metric object is built until the metric is first
//! used, so discovery itself never fails for lack of credentials. Problems
//! with individual specs are collected in an error map instead of aborting.

use crate::calibration::{CALIBRATION_PREFIX, CalibrationMetric, REGISTERED_TARGETS};
use crate::error::MetricError;
use crate::metrics::{
    Metric, MetricContext, MetricFamily, answer_completeness, answer_relevance,
    build_adapter, clarity, retrieval_coverage, retrieval_relevance, strict_faithfulness,
};
use crate::types::{JudgeInput, MetricResult};
use ragjudge_core::{JudgeSettings, LlmError, LlmProvider, RagJudgeConfig, create_provider};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Builds a metric from its construction context.
pub type MetricBuilder =
    Arc<dyn Fn(&MetricContext) -> Result<Arc<dyn Metric>, MetricError> + Send + Sync>;

/// Builds the judge provider on first use.
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn LlmProvider>, LlmError> + Send + Sync>;

/// Names never registered, whatever the configuration says.
pub const DEFAULT_DENYLIST: [&str; 4] = ["base", "judge", "utils", "aspects"];

static METRIC_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid metric name regex"));

/// One entry of the registration table.
#[derive(Clone)]
pub struct MetricSpec {
    pub name: String,
    pub family: MetricFamily,
    /// `false` opts the spec out of registration.
    pub is_metric: bool,
    pub description: String,
    pub build: MetricBuilder,
}

impl MetricSpec {
    pub fn new(
        name: impl Into<String>,
        family: MetricFamily,
        description: impl Into<String>,
        build: impl Fn(&MetricContext) -> Result<Arc<dyn Metric>, MetricError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            family,
            is_metric: true,
            description: description.into(),
            build: Arc::new(build),
        }
    }

    /// Mark the spec as a helper that must not be registered.
    pub fn opt_out(mut self) -> Self {
        self.is_metric = false;
        self
    }
}

impl std::fmt::Debug for MetricSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSpec")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("is_metric", &self.is_metric)
            .finish_non_exhaustive()
    }
}

fn base_spec(name: &'static str, family: MetricFamily, description: &str) -> MetricSpec {
    MetricSpec::new(name, family, description, move |ctx| build_adapter(name, ctx))
}

/// Every built-in metric, in registration order.
pub fn builtin_specs() -> Vec<MetricSpec> {
    let mut specs = vec![
        base_spec(
            strict_faithfulness::NAME,
            MetricFamily::Answer,
            "Share of answer claims grounded in the contexts",
        ),
        base_spec(
            answer_completeness::NAME,
            MetricFamily::Answer,
            "Share of question aspects the answer covers",
        ),
        base_spec(
            answer_relevance::NAME,
            MetricFamily::Answer,
            "Topical alignment of the answer with the question",
        ),
        base_spec(
            clarity::NAME,
            MetricFamily::Answer,
            "Linguistic clarity of the answer",
        ),
        base_spec(
            retrieval_coverage::NAME,
            MetricFamily::Retrieval,
            "Share of question aspects supported by the contexts",
        ),
        base_spec(
            retrieval_relevance::NAME,
            MetricFamily::Retrieval,
            "Share of contexts relevant to the question",
        ),
        // Aspect extraction is shared machinery, not a metric.
        MetricSpec::new(
            "aspects",
            MetricFamily::Answer,
            "Question aspect extraction",
            |_| Err(MetricError::construction("aspects", "aspect extraction is not a metric")),
        )
        .opt_out(),
    ];

    for target in REGISTERED_TARGETS {
        specs.push(MetricSpec::new(
            format!("{CALIBRATION_PREFIX}{target}"),
            MetricFamily::Calibration,
            format!("Inter-judge agreement for {target}"),
            move |ctx| {
                let metric: Arc<dyn Metric> = Arc::new(CalibrationMetric::for_target(target, ctx)?);
                Ok(metric)
            },
        ));
    }
    specs
}

/// The default provider factory: the OpenAI-compatible provider from `llm` config.
pub fn provider_factory(config: &RagJudgeConfig) -> ProviderFactory {
    let llm = config.llm.clone();
    Arc::new(move || create_provider(&llm))
}

struct Entry {
    spec: MetricSpec,
    instance: OnceCell<Arc<dyn Metric>>,
}

/// Named, lazily built metrics.
pub struct MetricRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    denylist: HashSet<String>,
    discovery_errors: BTreeMap<String, String>,
    provider_factory: ProviderFactory,
    context: OnceCell<MetricContext>,
    config: Arc<RagJudgeConfig>,
}

impl MetricRegistry {
    fn empty(provider_factory: ProviderFactory, config: RagJudgeConfig) -> Self {
        let denylist = DEFAULT_DENYLIST
            .iter()
            .map(|s| s.to_string())
            .chain(config.metrics.denylist.iter().cloned())
            .collect();
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            denylist,
            discovery_errors: BTreeMap::new(),
            provider_factory,
            context: OnceCell::new(),
            config: Arc::new(config),
        }
    }

    /// Discover the built-in metrics plus `extra` specs.
    pub fn discover(
        extra: Vec<MetricSpec>,
        provider_factory: ProviderFactory,
        config: RagJudgeConfig,
    ) -> Self {
        let specs = builtin_specs().into_iter().chain(extra);
        Self::from_specs(specs, provider_factory, config)
    }

    /// Build a registry from exactly `specs`.
    pub fn from_specs(
        specs: impl IntoIterator<Item = MetricSpec>,
        provider_factory: ProviderFactory,
        config: RagJudgeConfig,
    ) -> Self {
        let mut registry = Self::empty(provider_factory, config);
        for spec in specs {
            if !spec.is_metric {
                debug!(metric = %spec.name, "Skipping opted-out spec");
                continue;
            }
            if registry.denylist.contains(&spec.name) {
                debug!(metric = %spec.name, "Skipping denylisted spec");
                continue;
            }
            if spec.family == MetricFamily::Calibration && !registry.config.metrics.include_calibration {
                debug!(metric = %spec.name, "Calibration metrics disabled");
                continue;
            }
            let key = if spec.name.trim().is_empty() {
                "<unnamed>".to_string()
            } else {
                spec.name.clone()
            };
            if let Err(message) = registry.insert(spec) {
                warn!(metric = %key, error = %message, "Metric discovery problem");
                registry.discovery_errors.insert(key, message);
            }
        }
        info!(
            count = registry.entries.len(),
            errors = registry.discovery_errors.len(),
            "Metric discovery complete"
        );
        registry
    }

    fn insert(&mut self, spec: MetricSpec) -> Result<(), String> {
        if spec.name.trim().is_empty() {
            return Err("metric name is empty".to_string());
        }
        if !METRIC_NAME_RE.is_match(&spec.name) {
            return Err(format!(
                "malformed metric name '{}': expected lowercase letters, digits and underscores",
                spec.name
            ));
        }
        if self.denylist.contains(&spec.name) {
            return Err(format!("metric name '{}' is reserved", spec.name));
        }
        if self.index.contains_key(&spec.name) {
            return Err(format!("duplicate metric name '{}'", spec.name));
        }
        debug!(metric = %spec.name, family = %spec.family, "Registering metric");
        self.index.insert(spec.name.clone(), self.entries.len());
        self.entries.push(Entry {
            spec,
            instance: OnceCell::new(),
        });
        Ok(())
    }

    /// Register one spec explicitly.
    ///
    /// Denylisted names are rejected, as are malformed and duplicate ones.
    pub fn register(&mut self, spec: MetricSpec) -> Result<(), MetricError> {
        let name = spec.name.clone();
        self.insert(spec)
            .map_err(|message| MetricError::construction(name, message))
    }

    /// Registered metric names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn spec(&self, name: &str) -> Option<&MetricSpec> {
        self.index.get(name).map(|&i| &self.entries[i].spec)
    }

    pub fn family_of(&self, name: &str) -> Option<MetricFamily> {
        self.spec(name).map(|s| s.family)
    }

    /// Problems recorded during discovery, keyed by spec name.
    pub fn discovery_errors(&self) -> &BTreeMap<String, String> {
        &self.discovery_errors
    }

    pub fn config(&self) -> &RagJudgeConfig {
        &self.config
    }

    /// Judge settings for one metric call.
    pub fn settings_for(&self, name: &str) -> JudgeSettings {
        self.config.judge_settings_for(name)
    }

    async fn context(&self) -> Result<&MetricContext, LlmError> {
        self.context
            .get_or_try_init(|| async {
                let provider = (self.provider_factory)()?;
                debug!(model = provider.model_name(), "Judge provider initialised");
                Ok::<_, LlmError>(MetricContext::new(provider, self.config.clone()))
            })
            .await
    }

    /// The metric named `name`, constructed on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Metric>, MetricError> {
        let &i = self.index.get(name).ok_or_else(|| MetricError::NotFound {
            name: name.to_string(),
        })?;
        let entry = &self.entries[i];
        let metric = entry
            .instance
            .get_or_try_init(|| async {
                let ctx = self
                    .context()
                    .await
                    .map_err(|e| MetricError::construction(name, e.to_string()))?;
                debug!(metric = %name, "Constructing metric");
                (entry.spec.build)(ctx)
            })
            .await?;
        Ok(metric.clone())
    }

    /// Run `name` on one input and normalise the outcome under the registry name.
    pub async fn evaluate(&self, name: &str, input: &JudgeInput) -> Result<MetricResult, MetricError> {
        let metric = self.get(name).await?;
        let settings = self.settings_for(name);
        let outcome = metric.evaluate(input, &settings).await?;
        Ok(MetricResult::from_outcome(name, outcome))
    }
}

/// The available metrics that were requested, in `available` order.
///
/// An empty request selects everything. Unknown names are dropped with a warning.
pub fn select_metrics(requested: &[String], available: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return available.to_vec();
    }
    for name in requested.iter().filter(|n| !available.contains(n)) {
        warn!(metric = %name, "Unknown metric requested; ignoring");
    }
    available
        .iter()
        .filter(|name| requested.contains(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ragjudge_core::MockLlmProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock_factory() -> ProviderFactory {
        Arc::new(|| {
            let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::new());
            Ok(provider)
        })
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_discovery() {
        let registry = MetricRegistry::discover(vec![], mock_factory(), RagJudgeConfig::default());
        assert_eq!(
            registry.names(),
            names(&[
                "strict_faithfulness",
                "answer_completeness",
                "answer_relevance",
                "clarity",
                "retrieval_coverage",
                "retrieval_relevance",
                "calibration_strict_faithfulness",
                "calibration_answer_completeness",
                "calibration_retrieval_coverage",
            ])
        );
        assert!(!registry.contains("aspects"));
        assert!(registry.discovery_errors().is_empty());
    }

    #[test]
    fn test_denylist_and_calibration_toggle() {
        let mut config = RagJudgeConfig::default();
        config.metrics.denylist = vec!["clarity".into()];
        config.metrics.include_calibration = false;
        let registry = MetricRegistry::discover(vec![], mock_factory(), config);
        assert!(!registry.contains("clarity"));
        assert!(registry.names().iter().all(|n| !n.starts_with("calibration_")));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_register_rejects_denylisted_names() {
        let mut config = RagJudgeConfig::default();
        config.metrics.denylist = vec!["legacy_score".into()];
        let mut registry = MetricRegistry::empty(mock_factory(), config);
        let build = |_: &MetricContext| -> Result<Arc<dyn Metric>, MetricError> {
            Err(MetricError::construction("x", "unused"))
        };

        for name in ["judge", "aspects", "legacy_score"] {
            let err = registry
                .register(MetricSpec::new(name, MetricFamily::Answer, "", build))
                .unwrap_err();
            assert!(err.to_string().contains("reserved"));
            assert!(!registry.contains(name));
        }
        assert!(
            registry
                .register(MetricSpec::new("custom_score", MetricFamily::Answer, "", build))
                .is_ok()
        );
        assert_eq!(registry.names(), names(&["custom_score"]));
    }

    #[test]
    fn test_bad_specs_recorded_not_fatal() {
        let ok = |_: &MetricContext| -> Result<Arc<dyn Metric>, MetricError> {
            Err(MetricError::construction("x", "unused"))
        };
        let specs = vec![
            MetricSpec::new("", MetricFamily::Answer, "", ok),
            MetricSpec::new("Bad-Name", MetricFamily::Answer, "", ok),
            MetricSpec::new("good_one", MetricFamily::Answer, "", ok),
            MetricSpec::new("good_one", MetricFamily::Answer, "", ok),
        ];
        let registry = MetricRegistry::from_specs(specs, mock_factory(), RagJudgeConfig::default());
        assert_eq!(registry.names(), names(&["good_one"]));
        let errors = registry.discovery_errors();
        assert_eq!(errors.len(), 3);
        assert!(errors["<unnamed>"].contains("empty"));
        assert!(errors["Bad-Name"].contains("malformed"));
        assert!(errors["good_one"].contains("duplicate"));
    }

    #[tokio::test]
    async fn test_lazy_provider_construction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory: ProviderFactory = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let provider: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::new());
            Ok(provider)
        });
        let registry = MetricRegistry::discover(vec![], factory, RagJudgeConfig::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let a = registry.get("clarity").await.unwrap();
        let b = registry.get("clarity").await.unwrap();
        registry.get("answer_relevance").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_surface_at_first_use() {
        let factory: ProviderFactory = Arc::new(|| {
            Err(LlmError::AuthFailed {
                reason: "env var 'OPENAI_API_KEY' not set".into(),
            })
        });
        let registry = MetricRegistry::discover(vec![], factory, RagJudgeConfig::default());
        assert_eq!(registry.len(), 9);
        let err = registry.get("clarity").await.err().unwrap();
        assert!(matches!(err, MetricError::Construction { .. }));
        assert!(matches!(
            registry.get("bleu").await.err().unwrap(),
            MetricError::NotFound { .. }
        ));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = MetricRegistry::discover(vec![], mock_factory(), RagJudgeConfig::default());
        let spec = MetricSpec::new("clarity", MetricFamily::Answer, "", |ctx| build_adapter("clarity", ctx));
        assert!(registry.register(spec).is_err());
        let spec = MetricSpec::new("clarity_v2", MetricFamily::Answer, "", |ctx| build_adapter("clarity", ctx));
        registry.register(spec).unwrap();
        assert_eq!(registry.names().last().map(String::as_str), Some("clarity_v2"));
    }

    #[test]
    fn test_select_metrics() {
        let available = names(&["a", "b", "c"]);
        assert_eq!(select_metrics(&[], &available), available);
        assert_eq!(select_metrics(&names(&["b"]), &available), names(&["b"]));
        assert_eq!(
            select_metrics(&names(&["c", "zzz", "a", "c"]), &available),
            names(&["a", "c"])
        );
        assert!(select_metrics(&names(&["zzz"]), &available).is_empty());
    }
}
