//! Generation backends.
//!
//! The pipeline only needs "prompt in, text out". Each backend maps its
//! transport failures onto [`GenerationError`] so callers can tell an
//! unreachable backend from one that answered badly.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use crate::config::{ModelConfig, Provider};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Failure to obtain text from the generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to generation backend at {0}")]
    Unreachable(String),

    #[error("generation quota exceeded: {0}")]
    Quota(String),

    #[error("generation backend error {status}: {body}")]
    Backend { status: StatusCode, body: String },

    #[error("failed to send generation request: {0}")]
    Request(String),

    #[error("failed to parse generation response: {0}")]
    Decode(String),

    #[error("generation backend returned no text")]
    EmptyResponse,
}

/// A backend that turns a prompt into raw text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short `provider:model` label for logs and reports.
    fn describe(&self) -> String;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build the backend selected in the configuration.
pub fn build_generator(config: &ModelConfig) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match config.provider {
        Provider::Gemini => Arc::new(GeminiClient::from_config(config)?),
        Provider::Ollama => Arc::new(OllamaClient::from_config(config)?),
    };
    Ok(generator)
}

/// Map a reqwest send error the way every backend reports it.
fn classify_send_error(e: reqwest::Error, timeout_seconds: u64, base_url: &str) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(timeout_seconds)
    } else if e.is_connect() {
        GenerationError::Unreachable(base_url.to_string())
    } else {
        GenerationError::Request(e.to_string())
    }
}

/// Turn a non-success response into the matching error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(GenerationError::Quota(body))
    } else {
        Err(GenerationError::Backend { status, body })
    }
}

/// Reading the body can also hit the client timeout.
fn classify_body_error(e: reqwest::Error, timeout_seconds: u64) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout(timeout_seconds)
    } else {
        GenerationError::Decode(e.to_string())
    }
}
