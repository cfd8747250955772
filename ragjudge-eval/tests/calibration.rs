//! Calibration harness behaviour against a scripted judge.

use pretty_assertions::assert_eq;
use ragjudge_core::{LlmProvider, MockLlmProvider, RagJudgeConfig};
use ragjudge_eval::calibration::{CalibrationHarness, CalibrationTarget, JudgeSpec};
use ragjudge_eval::{JudgeInput, MetricContext, MetricRegistry, ProviderFactory};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn input() -> JudgeInput {
    JudgeInput::new(
        "What is the capital of France?",
        "Paris.",
        vec!["Paris is the capital of France.".into()],
    )
}

fn clarity_panel() -> CalibrationTarget {
    CalibrationTarget {
        metric_name: "clarity".into(),
        judges: vec![
            JudgeSpec::new("j1", "model-a", 0.0),
            JudgeSpec::new("j2", "model-b", 0.2),
            JudgeSpec::new("j3", "model-c", 0.5),
        ],
    }
}

fn env_snapshot() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

#[tokio::test]
async fn spread_and_agreement_from_three_judges() {
    let mock = Arc::new(MockLlmProvider::new());
    mock.queue_text(r#"{"score": 0.9, "explanation": "clear"}"#);
    mock.queue_text(r#"{"score": 0.9, "explanation": "clear"}"#);
    mock.queue_text(r#"{"score": 0.5, "explanation": "choppy"}"#);

    let harness = CalibrationHarness::new(MetricContext::for_provider(mock.clone()));
    let result = harness.run(&input(), &clarity_panel()).await.unwrap();

    assert_eq!(result.name, "calibration_clarity");
    assert!((result.score - 0.6).abs() < 1e-9);
    assert!((result.details["spread"].as_f64().unwrap() - 0.4).abs() < 1e-9);
    assert!((result.details["confidence"].as_f64().unwrap() - 0.6).abs() < 1e-9);
    assert_eq!(result.details["min"], json!(0.5));
    assert_eq!(result.details["max"], json!(0.9));
    assert_eq!(result.details["sub_scores"]["j3"], json!(0.5));
    assert_eq!(result.details["judge_outputs"]["j3"]["explanation"], "choppy");
    assert_eq!(result.details["errors"], json!({}));
    assert_eq!(
        result.explanation.as_deref(),
        Some("Calibration for clarity: 3 judges, range [0.50, 0.90], spread=0.40, agreement=0.60.")
    );

    // Each judge's settings reached the provider unchanged.
    let sent: Vec<(Option<String>, f32)> = mock
        .requests()
        .into_iter()
        .map(|r| (r.model, r.temperature))
        .collect();
    assert_eq!(
        sent,
        vec![
            (Some("model-a".to_string()), 0.0),
            (Some("model-b".to_string()), 0.2),
            (Some("model-c".to_string()), 0.5),
        ]
    );
}

#[tokio::test]
async fn all_judges_failing_yields_zero_with_errors() {
    let mock = Arc::new(
        MockLlmProvider::new()
            .fail_model("gpt-4o-mini")
            .fail_model("gpt-4.1-mini"),
    );
    let harness = CalibrationHarness::new(MetricContext::for_provider(mock));
    let target = CalibrationTarget::default_for("answer_relevance").unwrap();
    let result = harness.run(&input(), &target).await.unwrap();

    assert_eq!(result.score, 0.0);
    assert_eq!(result.details["sub_scores"], json!({}));
    assert_eq!(result.details["spread"], json!(1.0));
    assert_eq!(result.details["confidence"], json!(0.0));
    assert_eq!(
        result.explanation.as_deref(),
        Some("Calibration failed for answer_relevance; no valid scores")
    );
    let mut error_keys: Vec<String> = result.details["errors"]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    error_keys.sort();
    let mut expected: Vec<String> = target.judges.iter().map(|j| j.name.clone()).collect();
    expected.sort();
    assert_eq!(error_keys, expected);
}

#[tokio::test]
async fn unparseable_judge_counts_as_zero_not_error() {
    let mock = Arc::new(MockLlmProvider::new().fail_model("model-c"));
    mock.queue_text(r#"{"score": 0.7}"#);
    mock.queue_text("no json here");

    let harness = CalibrationHarness::new(MetricContext::for_provider(mock));
    let result = harness.run(&input(), &clarity_panel()).await.unwrap();

    assert_eq!(result.details["sub_scores"], json!({"j1": 0.7, "j2": 0.0}));
    assert!(result.details["errors"]["j3"].is_string());
    assert!(result.details["judge_outputs"]["j2"]["raw"]["error"].is_string());
    assert!((result.score - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn calibration_leaves_the_environment_untouched() {
    let before = env_snapshot();
    let mock = Arc::new(MockLlmProvider::with_response(r#"{"score": 0.5}"#).fail_model("gpt-4.1-mini"));
    let harness = CalibrationHarness::new(MetricContext::for_provider(mock));
    let target = CalibrationTarget::default_for("clarity").unwrap();
    let result = harness.run(&input(), &target).await.unwrap();

    assert_eq!(result.details["errors"].as_object().unwrap().len(), 2);
    assert_eq!(result.score, 1.0);
    assert_eq!(env_snapshot(), before);
}

#[tokio::test]
async fn registered_calibration_metric_uses_default_panel() {
    let mock = Arc::new(
        MockLlmProvider::with_response(
            r#"{"strict_faithfulness": 1.0, "supported_claims": [{"claim": "Paris", "supported_by": "[1]"}], "hallucinated_claims": []}"#,
        ),
    );
    let factory: ProviderFactory = Arc::new(move || {
        let provider: Arc<dyn LlmProvider> = mock.clone();
        Ok(provider)
    });
    let registry = MetricRegistry::discover(vec![], factory, RagJudgeConfig::default());
    let result = registry
        .evaluate("calibration_strict_faithfulness", &input())
        .await
        .unwrap();

    assert_eq!(result.name, "calibration_strict_faithfulness");
    assert_eq!(result.score, 1.0);
    let judges = result.details["sub_scores"].as_object().unwrap();
    assert_eq!(judges.len(), 6);
    assert!(judges.keys().all(|k| k.starts_with("sf_")));
}

#[tokio::test]
async fn unknown_target_is_an_error() {
    let harness = CalibrationHarness::new(MetricContext::for_provider(Arc::new(MockLlmProvider::new())));
    let target = CalibrationTarget {
        metric_name: "bleu".into(),
        judges: vec![],
    };
    assert!(harness.run(&input(), &target).await.is_err());
}
