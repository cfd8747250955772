//! Subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::{Context, anyhow, bail};
use ragjudge_core::RagJudgeConfig;
use ragjudge_eval::calibration::{CalibrationHarness, CalibrationTarget};
use ragjudge_eval::manual::coerce_records;
use ragjudge_eval::registry::provider_factory;
use ragjudge_eval::report::parse_formats;
use ragjudge_eval::{
    Aggregation, AgenticOrchestrator, EvalReport, EvaluationAgent, ItemEvaluation, JudgeInput,
    MetricContext, MetricRegistry, read_jsonl, save_all_formats, save_per_item,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Flags shared by every subcommand.
#[derive(Debug, Clone)]
pub(crate) struct GlobalOptions {
    pub workspace: PathBuf,
    pub model: Option<String>,
    pub verbose: u8,
}

pub(crate) async fn handle_command(command: Commands, opts: &GlobalOptions) -> anyhow::Result<()> {
    match command {
        Commands::ListMetrics => handle_list_metrics(opts),
        Commands::Eval {
            input,
            metrics,
            out_base,
            formats,
            per_item,
        } => handle_eval(opts, &input, &metrics, &out_base, &formats, per_item).await,
        Commands::Agentic {
            input,
            out_base,
            formats,
            max_items,
        } => handle_agentic(opts, &input, &out_base, &formats, max_items).await,
        Commands::Calibrate {
            input,
            metric,
            out_base,
            formats,
            max_items,
        } => handle_calibrate(opts, &input, &metric, &out_base, &formats, max_items).await,
        Commands::DebugMetrics { input, metrics } => handle_debug_metrics(opts, &input, &metrics).await,
        Commands::Config { action } => handle_config(action, opts),
    }
}

fn load_config(opts: &GlobalOptions) -> anyhow::Result<RagJudgeConfig> {
    let mut config = ragjudge_core::load_config(Some(&opts.workspace), None)?;
    if let Some(model) = &opts.model {
        config.llm.model = model.clone();
    }
    Ok(config)
}

fn build_registry(config: RagJudgeConfig) -> Arc<MetricRegistry> {
    let factory = provider_factory(&config);
    Arc::new(MetricRegistry::discover(Vec::new(), factory, config))
}

/// Read input records, keeping at most `max_items`. Zero records is fatal.
fn load_records(input: &Path, max_items: Option<usize>) -> anyhow::Result<Vec<Value>> {
    let mut records =
        read_jsonl(input).with_context(|| format!("Failed to read items from {}", input.display()))?;
    if let Some(max) = max_items {
        records.truncate(max);
    }
    if records.is_empty() {
        bail!("No items to evaluate in {}", input.display());
    }
    info!(items = records.len(), input = %input.display(), "Loaded items");
    Ok(records)
}

fn write_reports(report: &EvalReport, out_base: &Path, formats: &str) -> anyhow::Result<Vec<PathBuf>> {
    let written = save_all_formats(report, out_base, &parse_formats(formats))
        .with_context(|| format!("Failed to write reports to {}", out_base.display()))?;
    for path in &written {
        println!("Wrote {}", path.display());
    }
    Ok(written)
}

fn print_summary(report: &EvalReport) {
    if report.summary.is_empty() {
        println!("No metric scores recorded.");
        return;
    }
    println!("Summary over {} item(s):", report.results.len());
    for (name, score) in &report.summary {
        println!("  {name:<32} {score:.3}");
    }
}

fn handle_list_metrics(opts: &GlobalOptions) -> anyhow::Result<()> {
    let registry = build_registry(load_config(opts)?);
    println!("Registered metrics ({}):", registry.len());
    for name in registry.names() {
        let family = registry
            .family_of(&name)
            .map(|f| f.to_string())
            .unwrap_or_default();
        println!("  {name:<40} {family}");
    }
    if opts.verbose > 0 && !registry.discovery_errors().is_empty() {
        println!("\nDiscovery errors:");
        for (name, error) in registry.discovery_errors() {
            println!("  {name}: {error}");
        }
    }
    Ok(())
}

async fn handle_eval(
    opts: &GlobalOptions,
    input: &Path,
    metrics: &[String],
    out_base: &Path,
    formats: &str,
    per_item: bool,
) -> anyhow::Result<()> {
    let records = load_records(input, None)?;
    let agent = EvaluationAgent::new(build_registry(load_config(opts)?), metrics);
    if agent.metrics().is_empty() {
        bail!("No metrics available to run");
    }
    println!("Running metrics: {}", agent.metrics().join(", "));

    let report = agent.evaluate_items(&records, Aggregation::Mean).await?;
    write_reports(&report, out_base, formats)?;
    if per_item {
        let written = save_per_item(&report, out_base, &parse_formats(formats))?;
        println!("Wrote {} per-item report file(s)", written.len());
    }
    print_summary(&report);
    Ok(())
}

async fn handle_agentic(
    opts: &GlobalOptions,
    input: &Path,
    out_base: &Path,
    formats: &str,
    max_items: Option<usize>,
) -> anyhow::Result<()> {
    let records = load_records(input, max_items)?;
    let registry = build_registry(load_config(opts)?);
    if registry.is_empty() {
        bail!("No metrics available to run");
    }

    let report = AgenticOrchestrator::new(registry).run(&records).await?;
    write_reports(&report, out_base, formats)?;
    print_summary(&report);
    Ok(())
}

async fn handle_calibrate(
    opts: &GlobalOptions,
    input: &Path,
    metric: &str,
    out_base: &Path,
    formats: &str,
    max_items: Option<usize>,
) -> anyhow::Result<()> {
    let config = load_config(opts)?;
    let target = CalibrationTarget::resolve(metric, &config)
        .ok_or_else(|| anyhow!("No calibration judges defined for metric '{metric}'"))?;
    let records = load_records(input, max_items)?;
    let items = coerce_records(&records)?;

    let provider = provider_factory(&config)().context("Failed to create judge provider")?;
    let harness = CalibrationHarness::new(MetricContext::new(provider, Arc::new(config)));
    println!(
        "Calibrating {metric} with {} judge(s) over {} item(s)",
        target.judges.len(),
        items.len()
    );

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let started = Instant::now();
        let result = harness.run(&JudgeInput::from(&item), &target).await?;
        results.push(ItemEvaluation {
            item,
            aggregate: Some(result.score),
            metrics: vec![result],
            eval_time_sec: started.elapsed().as_secs_f64(),
        });
    }

    let report = EvalReport::from_results(results);
    write_reports(&report, out_base, formats)?;
    print_summary(&report);
    Ok(())
}

async fn handle_debug_metrics(opts: &GlobalOptions, input: &Path, metrics: &[String]) -> anyhow::Result<()> {
    let records = load_records(input, Some(1))?;
    let item = coerce_records(&records)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No items to evaluate in {}", input.display()))?;

    let agent = EvaluationAgent::new(build_registry(load_config(opts)?), metrics);
    if agent.metrics().is_empty() {
        bail!("No metrics available to run");
    }
    let evaluation = agent
        .evaluate_item(&item, agent.metrics(), Aggregation::None)
        .await;
    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}

fn handle_config(action: ConfigAction, opts: &GlobalOptions) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = opts.workspace.join(".ragjudge");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&RagJudgeConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            if !ragjudge_core::config::config_exists(Some(&opts.workspace)) {
                println!("# No configuration file found; showing built-in defaults");
            }
            let config = load_config(opts)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
