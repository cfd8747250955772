//! ragjudge CLI — batch LLM-as-judge evaluation of RAG outputs.
//!
//! Runs manual, agentic, and calibration evaluations over JSON Lines input
//! and writes JSON, Markdown, CSV and HTML reports.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ragjudge: evaluate RAG answers with LLM judges
#[derive(Parser, Debug)]
#[command(name = "ragjudge", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Judge model to use (overrides llm.model)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory (where .ragjudge/config.toml is looked up)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// List registered metrics
    ListMetrics,
    /// Evaluate items with a fixed metric selection
    Eval {
        /// JSON Lines input file
        #[arg(short, long)]
        input: PathBuf,
        /// Metric to run (repeatable; all metrics when omitted)
        #[arg(long = "metrics", num_args = 1..)]
        metrics: Vec<String>,
        /// Output path without extension
        #[arg(long, default_value = "report_manual")]
        out_base: PathBuf,
        /// Comma-separated report formats
        #[arg(long, default_value = "json,md,csv,html")]
        formats: String,
        /// Also write one report per item
        #[arg(long)]
        per_item: bool,
    },
    /// Evaluate items, choosing metrics per item
    Agentic {
        /// JSON Lines input file
        #[arg(short, long)]
        input: PathBuf,
        /// Output path without extension
        #[arg(long, default_value = "report_agentic")]
        out_base: PathBuf,
        /// Comma-separated report formats
        #[arg(long, default_value = "json,md,csv,html")]
        formats: String,
        /// Evaluate at most this many items
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Score items with a panel of judges and report their agreement
    Calibrate {
        /// JSON Lines input file
        #[arg(short, long)]
        input: PathBuf,
        /// Metric to calibrate
        #[arg(long)]
        metric: String,
        /// Output path without extension
        #[arg(long, default_value = "report_calibration")]
        out_base: PathBuf,
        /// Comma-separated report formats
        #[arg(long, default_value = "json,md")]
        formats: String,
        /// Evaluate at most this many items
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Run metrics on the first item and print the raw results
    DebugMetrics {
        /// JSON Lines input file
        #[arg(short, long)]
        input: PathBuf,
        /// Metric to run (repeatable; all metrics when omitted)
        #[arg(long = "metrics", num_args = 1..)]
        metrics: Vec<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Show the merged configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = ragjudge_core::config::project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragjudge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let options = commands::GlobalOptions {
        workspace,
        model: cli.model,
        verbose: cli.verbose,
    };
    commands::handle_command(cli.command, &options).await
}
