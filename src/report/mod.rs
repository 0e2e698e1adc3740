//! Report output for one-shot analyses.

pub mod generator;

pub use generator::{summary_lines, write_json_report, AnalysisReport, ReportMetadata};
