//! Prompt composition.
//!
//! A prompt is the response protocol followed by a bounded excerpt of the
//! aggregated data and the user's question. Composition is pure: the same
//! context and question always produce the same text.

use crate::config::PromptConfig;
use crate::models::{AnalysisContext, SourceKind};
use anyhow::{Context, Result};
use serde_json::Value;

/// Built-in response protocol (widget kinds, payload fields, formatting rules).
pub const DEFAULT_PROTOCOL: &str = include_str!("../../prompts/protocol_v1.txt");

/// Renders an [`AnalysisContext`] and a question into model input.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    protocol: String,
    max_records: usize,
}

impl PromptComposer {
    pub fn new(protocol: impl Into<String>, max_records: usize) -> Self {
        Self {
            protocol: protocol.into(),
            max_records,
        }
    }

    /// Build a composer from config, reading the protocol override if one is set.
    pub fn from_config(config: &PromptConfig) -> Result<Self> {
        let protocol = match config.protocol_file {
            Some(ref path) => std::fs::read_to_string(path).with_context(|| {
                format!("Failed to read protocol file: {}", path.display())
            })?,
            None => DEFAULT_PROTOCOL.to_string(),
        };

        Ok(Self::new(protocol, config.max_records_per_source))
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Compose the full prompt text.
    pub fn compose(&self, context: &AnalysisContext, question: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(self.protocol.trim_end());
        prompt.push_str("\n\n=== DADOS DO SISTEMA ===\n\n");

        for source in SourceKind::ALL {
            prompt.push_str(&self.data_section(source, context.slot(source)));
        }

        prompt.push_str("=== PERGUNTA DO USUÁRIO ===\n");
        prompt.push_str(question.trim());
        prompt.push_str(
            "\n\nIMPORTANTE: retorne APENAS o JSON com os widgets, sem nenhum texto antes ou depois.",
        );

        prompt
    }

    /// One source rendered as a header with its total and the first N records.
    fn data_section(&self, source: SourceKind, records: &[Value]) -> String {
        let shown = &records[..records.len().min(self.max_records)];
        let excerpt = Value::Array(shown.to_vec());

        format!(
            "{} ({} total, {} exibidos):\n{:#}\n\n",
            section_label(source),
            records.len(),
            shown.len(),
            excerpt
        )
    }
}

fn section_label(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Leads => "LEADS",
        SourceKind::Partners => "PARCEIROS/CLIENTES",
        SourceKind::Products => "PRODUTOS",
        SourceKind::Orders => "PEDIDOS",
    }
}
