//! Report rendering: JSON, Markdown, CSV and HTML views of an `EvalReport`.
//!
//! Markdown and HTML are rendered from Handlebars templates over a flat view
//! model; HTML output relies on the engine's default escaping.

use crate::error::EvalError;
use crate::types::{EvalReport, ItemEvaluation};
use handlebars::Handlebars;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Formats written when none are requested.
pub const DEFAULT_FORMATS: [&str; 1] = ["md"];

/// Formats `ReportBuilder::render` understands.
pub const REPORT_FORMATS: [&str; 4] = ["json", "md", "csv", "html"];

const CSV_HEADER: [&str; 9] = [
    "item_index",
    "metric",
    "score",
    "aggregate_for_item",
    "question",
    "answer",
    "contexts",
    "explanation",
    "eval_time_sec",
];

const MARKDOWN_TEMPLATE: &str = r#"# RAG Evaluation Report

{{#if summary}}
## Summary (mean scores of all cases)

| Metric | Mean score |
| :------ | ---------: |
{{#each summary}}
| **{{name}}** | {{score}} |
{{/each}}

{{/if}}
## Individual Case Report

{{#each cases}}
### Case {{index}}
- Question: {{question}}
- Answer: {{answer}}
{{#if contexts}}
- Contexts: {{context_count}}
{{#each contexts}}
  - [{{index}}] {{text}}
{{/each}}
{{/if}}
- Eval time: {{eval_time}} s

{{#if metrics}}
**Metric scores**

| Metric | Score |
| :------ | ----: |
{{#each metrics}}
| {{name}} | {{score}} |
{{/each}}

**Metric details**
{{#each metrics}}
- **{{name}}** ({{score}})
{{#if explanation}}
  - explanation: {{explanation}}
{{/if}}
{{#if details}}
  - details:

```json
{{details}}
```
{{/if}}
{{/each}}

{{/if}}
{{/each}}
"#;

const HTML_TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>RAG Evaluation Report</title>
<style>
  body { font-family: Inter, system-ui, -apple-system, Segoe UI, Roboto, sans-serif; max-width: 1100px; margin: 2rem auto; padding: 0 1rem; }
  .summary { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 12px; }
  .card { border: 1px solid #e6e6e6; border-radius: 12px; padding: 12px 14px; background: #fff; }
  .metric { display: flex; justify-content: space-between; }
  .pill { background: #f5f5f7; border-radius: 999px; padding: 2px 10px; font-variant-numeric: tabular-nums; }
  summary { cursor: pointer; font-weight: 600; }
  .mono { font-family: ui-monospace, SFMono-Regular, Menlo, Consolas, monospace; white-space: pre-wrap; }
  .grid { display: grid; grid-template-columns: 1fr; gap: 12px; }
  .item { border: 1px solid #efefef; border-radius: 12px; padding: 8px 10px; background: #fafafa; margin: 8px 0; }
  .badge { background: #eef7ff; border: 1px solid #c5e2ff; padding: 2px 8px; border-radius: 999px; font-size: .85em; }
</style>
</head>
<body>
<h1>RAG Evaluation Report</h1>
{{#if summary}}
<h2>Summary (mean scores)</h2>
<div class="summary">
{{#each summary}}
<div class="card metric"><div>{{name}}</div><div class="pill">{{score}}</div></div>
{{/each}}
</div>
{{/if}}
<h2>Evaluation Cases</h2>
{{#each cases}}
<details class="item">
<summary>Case {{index}}: {{snippet}}</summary>
<div><span class="badge">Question</span> {{question}}</div>
<div><span class="badge">Answer</span> {{answer}}</div>
<div><span class="badge">Eval time</span> {{eval_time}} s</div>
{{#if contexts}}
<div class="contexts"><span class="badge">Contexts</span><ol>
{{#each contexts}}
<li>{{text}}</li>
{{/each}}
</ol></div>
{{/if}}
<details open><summary>Metrics</summary>
<div class="grid">
{{#each metrics}}
<div class="card">
<div class="metric"><div>{{name}}</div><div class="pill">{{score}}</div></div>
{{#if explanation}}<div class="mono">{{explanation}}</div>{{/if}}
{{#if details}}<details><summary>details</summary><pre class="mono">{{details_snippet}}</pre></details>{{/if}}
</div>
{{/each}}
</div>
</details>
</details>
{{/each}}
</body>
</html>
"#;

const SNIPPET_CHARS: usize = 120;
const HTML_DETAILS_CHARS: usize = 2000;

fn fmt2(x: f64) -> String {
    format!("{x:.2}")
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

fn case_view(index: usize, evaluation: &ItemEvaluation) -> Value {
    let item = &evaluation.item;
    let metrics: Vec<Value> = evaluation
        .metrics
        .iter()
        .map(|m| {
            let details = if m.details.is_empty() {
                String::new()
            } else {
                serde_json::to_string_pretty(&m.details).unwrap_or_default()
            };
            json!({
                "name": m.name,
                "score": fmt2(m.score),
                "explanation": m.explanation.clone().unwrap_or_default(),
                "details_snippet": truncate_chars(&details, HTML_DETAILS_CHARS),
                "details": details,
            })
        })
        .collect();
    let contexts: Vec<Value> = item
        .contexts
        .iter()
        .enumerate()
        .map(|(i, c)| json!({"index": i + 1, "text": c}))
        .collect();

    json!({
        "index": index,
        "question": item.question,
        "snippet": truncate_chars(&item.question.trim().replace('\n', " "), SNIPPET_CHARS),
        "answer": item.answer,
        "context_count": item.contexts.len(),
        "contexts": contexts,
        "eval_time": fmt2(evaluation.eval_time_sec),
        "metrics": metrics,
    })
}

/// Renders and writes one report.
pub struct ReportBuilder<'a> {
    report: &'a EvalReport,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(report: &'a EvalReport) -> Self {
        Self { report }
    }

    fn view(&self) -> Value {
        let summary: Vec<Value> = self
            .report
            .summary
            .iter()
            .map(|(name, score)| json!({"name": name, "score": fmt2(*score)}))
            .collect();
        let cases: Vec<Value> = self
            .report
            .results
            .iter()
            .enumerate()
            .map(|(i, r)| case_view(i + 1, r))
            .collect();
        json!({"summary": summary, "cases": cases})
    }

    pub fn to_json(&self) -> Result<String, EvalError> {
        Ok(serde_json::to_string_pretty(self.report)?)
    }

    pub fn to_markdown(&self) -> Result<String, EvalError> {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(false);
        hb.register_escape_fn(handlebars::no_escape);
        Ok(hb.render_template(MARKDOWN_TEMPLATE, &self.view())?)
    }

    pub fn to_html(&self) -> Result<String, EvalError> {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(false);
        Ok(hb.render_template(HTML_TEMPLATE, &self.view())?)
    }

    /// One CSV row per (item, metric).
    pub fn to_csv(&self) -> Result<String, EvalError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;
        for (index, r) in self.report.results.iter().enumerate() {
            let aggregate = r.aggregate.map(|a| round2(a).to_string()).unwrap_or_default();
            let contexts = r.item.contexts.join(" || ");
            let eval_time = round2(r.eval_time_sec).to_string();
            for m in &r.metrics {
                writer.write_record([
                    index.to_string().as_str(),
                    m.name.as_str(),
                    round2(m.score).to_string().as_str(),
                    aggregate.as_str(),
                    r.item.question.as_str(),
                    r.item.answer.as_str(),
                    contexts.as_str(),
                    m.explanation.as_deref().unwrap_or_default(),
                    eval_time.as_str(),
                ])?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| EvalError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Render `format` (`json`, `md`, `csv` or `html`); `None` for unknown formats.
    pub fn render(&self, format: &str) -> Option<Result<String, EvalError>> {
        match format {
            "json" => Some(self.to_json()),
            "md" => Some(self.to_markdown()),
            "csv" => Some(self.to_csv()),
            "html" => Some(self.to_html()),
            _ => None,
        }
    }
}

/// Split a comma-separated format list; empty means the defaults.
pub fn parse_formats(spec: &str) -> Vec<String> {
    let formats: Vec<String> = spec
        .split(',')
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();
    if formats.is_empty() {
        DEFAULT_FORMATS.iter().map(|f| f.to_string()).collect()
    } else {
        formats
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), EvalError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// `<base>.<ext>`, keeping any dots already in the file name.
fn with_appended_extension(base: &Path, ext: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}

/// Write `report` as `<out_base>.<format>` for each requested format.
///
/// The extension is appended, so `runs/v1.2` writes `runs/v1.2.json`.
/// Unknown formats are skipped with a warning. Returns the written paths.
pub fn save_all_formats(
    report: &EvalReport,
    out_base: &Path,
    formats: &[String],
) -> Result<Vec<PathBuf>, EvalError> {
    let builder = ReportBuilder::new(report);
    let mut written = Vec::new();
    for format in formats {
        let Some(rendered) = builder.render(format) else {
            warn!(format = %format, "Unknown report format; skipping");
            continue;
        };
        let path = with_appended_extension(out_base, format);
        write_file(&path, &rendered?)?;
        info!(path = %path.display(), "Report written");
        written.push(path);
    }
    Ok(written)
}

/// Directory receiving per-item reports: `<out_base>_items`.
///
/// A trailing report extension (`report.json`) is dropped first; any other
/// dotted suffix is part of the name.
pub fn per_item_dir(out_base: &Path) -> PathBuf {
    let has_report_ext = out_base
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| REPORT_FORMATS.contains(&e));
    let stem = if has_report_ext {
        out_base.with_extension("")
    } else {
        out_base.to_path_buf()
    };
    let name = stem
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    stem.with_file_name(format!("{name}_items"))
}

/// Write one mini-report per item into `<out_base>_items/item_NNNN.*`.
pub fn save_per_item(
    report: &EvalReport,
    out_base: &Path,
    formats: &[String],
) -> Result<Vec<PathBuf>, EvalError> {
    if report.results.is_empty() {
        warn!("No results to write per item");
        return Ok(Vec::new());
    }
    let dir = per_item_dir(out_base);
    fs::create_dir_all(&dir)?;

    let mut written = Vec::new();
    for (i, result) in report.results.iter().enumerate() {
        let mini = EvalReport {
            results: vec![result.clone()],
            summary: Default::default(),
        };
        let base = dir.join(format!("item_{:04}", i + 1));
        written.extend(save_all_formats(&mini, &base, formats)?);
    }
    Ok(written)
}
