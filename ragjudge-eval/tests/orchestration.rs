//! End-to-end tests for the manual agent and the agentic orchestrator.
//!
//! Every test drives the built-in metrics against a scripted MockLlmProvider.

use pretty_assertions::assert_eq;
use ragjudge_core::{LlmProvider, MockLlmProvider, RagJudgeConfig};
use ragjudge_eval::agentic::{ANSWER_OVERALL, RETRIEVAL_OVERALL};
use ragjudge_eval::{
    Aggregation, AgenticOrchestrator, EvalError, EvaluationAgent, MetricRegistry, ProviderFactory,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// One response that every adapter can read.
const UNIVERSAL_RESPONSE: &str = r#"{
    "score": 0.8,
    "strict_faithfulness": 1.0,
    "supported_claims": [{"claim": "Paris is the capital", "supported_by": "[1]"}],
    "hallucinated_claims": [],
    "per_aspect": [{"aspect": "capital city", "covered": true, "evidence": "Paris"}],
    "aspects": [{"aspect": "capital city", "covered": true, "evidence": "capital of France"}],
    "per_chunk": [{"chunk_id": 1, "relevance": 0.9, "reason": "answers it"}],
    "explanation": "ok"
}"#;

fn scripted_provider() -> Arc<MockLlmProvider> {
    Arc::new(MockLlmProvider::with_response(UNIVERSAL_RESPONSE).route("atomic aspects", "- capital city"))
}

fn registry_over(mock: Arc<MockLlmProvider>) -> Arc<MetricRegistry> {
    let factory: ProviderFactory = Arc::new(move || {
        let provider: Arc<dyn LlmProvider> = mock.clone();
        Ok(provider)
    });
    Arc::new(MetricRegistry::discover(vec![], factory, RagJudgeConfig::default()))
}

fn full_record() -> Value {
    json!({
        "question": "What is the capital of France?",
        "answer": "Paris is the capital.",
        "contexts": ["Paris is the capital of France."]
    })
}

fn names(metrics: &[ragjudge_eval::MetricResult]) -> Vec<&str> {
    metrics.iter().map(|m| m.name.as_str()).collect()
}

#[tokio::test]
async fn agentic_full_item_runs_both_families_and_composites() {
    let mock = scripted_provider();
    let orchestrator = AgenticOrchestrator::new(registry_over(mock.clone()));
    let report = orchestrator.run(&[full_record()]).await.unwrap();
    let r = &report.results[0];

    assert_eq!(
        names(&r.metrics),
        vec![
            "retrieval_relevance",
            "retrieval_coverage",
            "strict_faithfulness",
            "answer_relevance",
            "answer_completeness",
            "clarity",
            RETRIEVAL_OVERALL,
            ANSWER_OVERALL,
        ]
    );
    let score = |name: &str| r.metric(name).unwrap().score;
    assert_eq!(score("retrieval_relevance"), 1.0);
    assert_eq!(score("retrieval_coverage"), 1.0);
    assert_eq!(score("strict_faithfulness"), 1.0);
    assert_eq!(score("answer_completeness"), 1.0);
    assert_eq!(score(RETRIEVAL_OVERALL), 1.0);
    assert!((score(ANSWER_OVERALL) - 0.93).abs() < 1e-9);

    // The aggregate covers the base metrics only.
    assert!((r.aggregate.unwrap() - 5.6 / 6.0).abs() < 1e-9);
    assert!(mock.call_count() > 0);
}

#[tokio::test]
async fn agentic_empty_item_is_a_shell_without_judge_calls() {
    let mock = scripted_provider();
    let orchestrator = AgenticOrchestrator::new(registry_over(mock.clone()));
    let report = orchestrator
        .run(&[json!({"question": "Anything?", "answer": "   ", "contexts": []})])
        .await
        .unwrap();

    let r = &report.results[0];
    assert!(r.metrics.is_empty());
    assert_eq!(r.aggregate, Some(0.0));
    assert_eq!(mock.call_count(), 0);
    assert!(report.summary.is_empty());
}

#[tokio::test]
async fn agentic_empty_batch_is_an_error() {
    let mock = scripted_provider();
    let orchestrator = AgenticOrchestrator::new(registry_over(mock.clone()));
    let err = orchestrator.run(&[]).await.unwrap_err();
    assert!(matches!(err, EvalError::NoItems));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn agentic_summary_averages_over_items_that_ran_each_metric() {
    let mock = scripted_provider();
    let orchestrator = AgenticOrchestrator::new(registry_over(mock));
    let records = vec![
        full_record(),
        json!({"question": "q", "answer": "", "contexts": []}),
        json!({"question": "Capital of Germany?", "answer": "Berlin"}),
    ];
    let report = orchestrator.run(&records).await.unwrap();

    let keys: Vec<&str> = report.summary.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "answer_completeness",
            "answer_overall",
            "answer_relevance",
            "clarity",
            "retrieval_coverage",
            "retrieval_overall",
            "retrieval_relevance",
            "strict_faithfulness",
        ]
    );
    assert_eq!(report.summary["retrieval_relevance"], 1.0);
    assert!((report.summary["clarity"] - 0.8).abs() < 1e-9);
    assert_eq!(report.results[2].metric("retrieval_relevance"), None);

    let sf_sum: f64 = report
        .results
        .iter()
        .filter_map(|r| r.metric("strict_faithfulness"))
        .map(|m| m.score)
        .sum();
    assert!((report.summary["strict_faithfulness"] - sf_sum / 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn manual_runs_selected_metrics_in_registry_order() {
    let mock = scripted_provider();
    let agent = EvaluationAgent::new(
        registry_over(mock),
        &["clarity".to_string(), "answer_relevance".to_string(), "bleu".to_string()],
    );
    assert_eq!(agent.metrics(), ["answer_relevance".to_string(), "clarity".to_string()]);

    let report = agent
        .evaluate_items(&[full_record(), full_record()], Aggregation::Mean)
        .await
        .unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(names(&report.results[0].metrics), vec!["answer_relevance", "clarity"]);
    assert!((report.summary["clarity"] - 0.8).abs() < 1e-9);
    assert!((report.results[1].aggregate.unwrap() - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn manual_judge_outage_downgrades_every_metric() {
    let mock = Arc::new(
        MockLlmProvider::new()
            .fail_model("gpt-4o-mini")
            .route("atomic aspects", "- capital city"),
    );
    let agent = EvaluationAgent::new(
        registry_over(mock),
        &[
            "strict_faithfulness".to_string(),
            "clarity".to_string(),
            "retrieval_relevance".to_string(),
        ],
    );
    let report = agent
        .evaluate_items(&[full_record()], Aggregation::Mean)
        .await
        .unwrap();

    let r = &report.results[0];
    assert_eq!(r.metrics.len(), 3);
    for m in &r.metrics {
        assert_eq!(m.score, 0.0);
        assert!(m.error().unwrap().contains("Judge call failed"), "{m:?}");
    }
    assert_eq!(r.aggregate, Some(0.0));
}

#[tokio::test]
async fn literal_match_rescues_verbatim_claims() {
    let mock = Arc::new(MockLlmProvider::with_response(
        r#"{"strict_faithfulness": 0.0,
            "supported_claims": [],
            "hallucinated_claims": [{"claim": "Paris is the   CAPITAL of France", "type": "full_hallucination", "reason": "?", "evidence": ""}],
            "explanation": "judge missed it"}"#,
    ));
    let agent = EvaluationAgent::new(registry_over(mock), &["strict_faithfulness".to_string()]);
    let report = agent
        .evaluate_items(&[full_record()], Aggregation::Mean)
        .await
        .unwrap();

    let sf = report.results[0].metric("strict_faithfulness").unwrap();
    assert_eq!(sf.score, 1.0);
    assert_eq!(sf.details["supported_claims"][0]["supported_by"], "literal-match");
    assert_eq!(sf.details["hallucinated_claims"], json!([]));
}
