//! Ollama `/api/chat` backend.

use super::{check_status, classify_body_error, classify_send_error, GenerationError, TextGenerator};
use crate::config::ModelConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Client for a local or remote Ollama server.
pub struct OllamaClient {
    http_client: reqwest::Client,
    base_url: String,
    model_name: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl OllamaClient {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client for Ollama")?;

        Ok(Self {
            http_client,
            base_url: config.effective_base_url(),
            model_name: config.name.clone(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model_name)
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = OllamaChatRequest {
            model: &self.model_name,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        debug!("Sending {} prompt bytes to {}", prompt.len(), url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_send_error(e, self.timeout_seconds, &self.base_url))?;

        let chat_response: OllamaChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| classify_body_error(e, self.timeout_seconds))?;

        let content = chat_response.message.content;
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(content)
    }
}
