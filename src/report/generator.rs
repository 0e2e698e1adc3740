//! JSON report generation.
//!
//! A report wraps the [`AnalysisResult`] exactly as the HTTP endpoint
//! returns it, together with metadata about the run.

use crate::models::{AnalysisResult, RecordCounts, WidgetPayload};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata about one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// The question that was asked.
    pub question: String,
    /// `provider:model` that generated the widgets.
    pub model_used: String,
    /// When the analysis finished.
    pub generated_at: DateTime<Utc>,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
    /// Records each source contributed.
    pub records: RecordCounts,
}

/// A complete one-shot analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    pub result: AnalysisResult,
}

/// Serialize a report as pretty JSON.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let content = generate_json_report(report)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

/// One line per widget, for the terminal summary.
pub fn summary_lines(report: &AnalysisReport) -> Vec<String> {
    report
        .result
        .widgets
        .iter()
        .map(|widget| {
            let detail = match &widget.payload {
                WidgetPayload::Explanation(_) => String::new(),
                WidgetPayload::Card(card) => format!(" = {}", card.value),
                WidgetPayload::Series(series) => format!(" ({} points)", series.values.len()),
                WidgetPayload::Scatter(scatter) => format!(" ({} points)", scatter.points.len()),
                WidgetPayload::Table(table) => {
                    format!(" ({} rows x {} columns)", table.rows.len(), table.columns.len())
                }
            };
            format!("[{}] {}{}", widget.kind, widget.title, detail)
        })
        .collect()
}
