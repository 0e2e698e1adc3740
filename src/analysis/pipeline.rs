//! Request orchestration: aggregate, compose, generate, extract.
//!
//! [`Pipeline::run`] never fails. Generation and extraction problems end
//! up as a degraded [`AnalysisResult`] with an error and no widgets.

use super::aggregator::aggregate;
use super::extract::extract;
use super::prompt::PromptComposer;
use crate::config::Config;
use crate::llm::{build_generator, TextGenerator};
use crate::models::{AnalysisContext, AnalysisRequest, AnalysisResult, RecordCounts};
use crate::sources::DataGateway;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Result of a pipeline run plus what the sources contributed.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub result: AnalysisResult,
    pub record_counts: RecordCounts,
}

/// Data gathering and prompt composition, the part of a run that needs no model.
#[derive(Debug, Clone)]
pub struct Preparer {
    gateway: DataGateway,
    composer: PromptComposer,
}

impl Preparer {
    pub fn new(gateway: DataGateway, composer: PromptComposer) -> Self {
        Self { gateway, composer }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            DataGateway::new(config.sources.clone())?,
            PromptComposer::from_config(&config.prompt)?,
        ))
    }

    pub fn max_records(&self) -> usize {
        self.composer.max_records()
    }

    /// Aggregate data and compose the prompt.
    pub async fn prepare(&self, request: &AnalysisRequest) -> (AnalysisContext, String) {
        let context = aggregate(&self.gateway, request.identity).await;
        let prompt = self.composer.compose(&context, &request.question);
        (context, prompt)
    }
}

/// The analysis pipeline. Cheap to clone; holds only read-only configuration.
#[derive(Clone)]
pub struct Pipeline {
    preparer: Preparer,
    generator: Arc<dyn TextGenerator>,
}

impl Pipeline {
    pub fn new(
        gateway: DataGateway,
        composer: PromptComposer,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            preparer: Preparer::new(gateway, composer),
            generator,
        }
    }

    /// Wire up the gateway, composer and generation backend from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            preparer: Preparer::from_config(config)?,
            generator: build_generator(&config.model)?,
        })
    }

    /// `provider:model` of the generation backend.
    pub fn generator_label(&self) -> String {
        self.generator.describe()
    }

    /// Aggregate data and compose the prompt without calling the model.
    pub async fn prepare(&self, request: &AnalysisRequest) -> (AnalysisContext, String) {
        self.preparer.prepare(request).await
    }

    pub async fn run(&self, request: &AnalysisRequest) -> AnalysisResult {
        self.run_detailed(request).await.result
    }

    pub async fn run_detailed(&self, request: &AnalysisRequest) -> PipelineOutcome {
        let started = Instant::now();
        info!("Analyzing question: {}", request.question);

        let (context, prompt) = self.prepare(request).await;
        let record_counts = context.record_counts();
        drop(context);

        let result = match self.generator.generate(&prompt).await {
            Ok(raw) => extract(&raw),
            Err(e) => {
                error!("Generation via {} failed: {}", self.generator.describe(), e);
                AnalysisResult::degraded(e.to_string())
            }
        };

        info!(
            "Analysis finished in {:.1}s with {} widgets{}",
            started.elapsed().as_secs_f64(),
            result.widgets.len(),
            if result.is_degraded() { " (degraded)" } else { "" }
        );

        PipelineOutcome {
            result,
            record_counts,
        }
    }
}
