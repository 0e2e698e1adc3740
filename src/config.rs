//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.insightgen.toml` files.

use crate::models::SourceKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".insightgen.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Business data sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Prompt composition settings.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path for one-shot analyses.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "insightgen_result.json".to_string()
}

/// Which generation backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Generative Language API
    #[default]
    Gemini,
    /// Local Ollama server
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend provider.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Base URL of the backend. Defaults depend on the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key (Gemini only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Generation timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

impl ModelConfig {
    /// Base URL to use, falling back to the provider's public default.
    pub fn effective_base_url(&self) -> String {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Provider::Gemini) => "https://generativelanguage.googleapis.com".to_string(),
            (None, Provider::Ollama) => "http://localhost:11434".to_string(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout() -> u64 {
    60
}

/// Business API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Base URL of the business API.
    #[serde(default = "default_sources_url")]
    pub base_url: String,

    /// Per-source request timeout in seconds.
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u64,

    /// Page size requested from paged sources.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_leads_endpoint")]
    pub leads: EndpointConfig,

    #[serde(default = "default_partners_endpoint")]
    pub partners: EndpointConfig,

    #[serde(default = "default_products_endpoint")]
    pub products: EndpointConfig,

    #[serde(default = "default_orders_endpoint")]
    pub orders: EndpointConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_url: default_sources_url(),
            timeout_seconds: default_source_timeout(),
            page_size: default_page_size(),
            leads: default_leads_endpoint(),
            partners: default_partners_endpoint(),
            products: default_products_endpoint(),
            orders: default_orders_endpoint(),
        }
    }
}

impl SourcesConfig {
    pub fn endpoint(&self, source: SourceKind) -> &EndpointConfig {
        match source {
            SourceKind::Leads => &self.leads,
            SourceKind::Partners => &self.partners,
            SourceKind::Products => &self.products,
            SourceKind::Orders => &self.orders,
        }
    }
}

/// One source endpoint.
///
/// `path` may contain the placeholders `{user_id}` and `{page_size}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub path: String,

    /// Name of the sequence field when the endpoint wraps records in an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

fn default_sources_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_source_timeout() -> u64 {
    10
}

fn default_page_size() -> usize {
    100
}

fn default_leads_endpoint() -> EndpointConfig {
    EndpointConfig {
        path: "/api/leads".to_string(),
        field: None,
    }
}

fn default_partners_endpoint() -> EndpointConfig {
    EndpointConfig {
        path: "/api/sankhya/parceiros?page=1&pageSize={page_size}".to_string(),
        field: Some("parceiros".to_string()),
    }
}

fn default_products_endpoint() -> EndpointConfig {
    EndpointConfig {
        path: "/api/sankhya/produtos?page=1&pageSize={page_size}".to_string(),
        field: Some("produtos".to_string()),
    }
}

fn default_orders_endpoint() -> EndpointConfig {
    EndpointConfig {
        path: "/api/sankhya/pedidos/listar?userId={user_id}".to_string(),
        field: None,
    }
}

/// Prompt composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Records per source included in the prompt (first N, in source order).
    #[serde(default = "default_max_records")]
    pub max_records_per_source: usize,

    /// Replace the built-in protocol description with the contents of this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_file: Option<PathBuf>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_records_per_source: default_max_records(),
            protocol_file: None,
        }
    }
}

fn default_max_records() -> usize {
    50
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.model_url {
            self.model.base_url = Some(url.clone());
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(ref url) = args.sources_url {
            self.sources.base_url = url.clone();
        }
        if let Some(timeout) = args.source_timeout {
            self.sources.timeout_seconds = timeout;
        }

        if let Some(max_records) = args.max_records {
            self.prompt.max_records_per_source = max_records;
        }

        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.provider, Provider::Gemini);
        assert_eq!(config.model.name, "gemini-2.0-flash-exp");
        assert_eq!(config.prompt.max_records_per_source, 50);
        assert_eq!(config.sources.page_size, 100);
        assert_eq!(
            config.sources.endpoint(SourceKind::Partners).field.as_deref(),
            Some("parceiros")
        );
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[model]
provider = "ollama"
name = "llama3.2:latest"
timeout_seconds = 120

[sources]
base_url = "http://erp.internal:5000"

[sources.orders]
path = "/api/v2/orders?actor={user_id}"
field = "items"

[prompt]
max_records_per_source = 20
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.effective_base_url(), "http://localhost:11434");
        assert_eq!(config.model.timeout_seconds, 120);
        assert_eq!(config.sources.base_url, "http://erp.internal:5000");
        assert_eq!(config.sources.orders.field.as_deref(), Some("items"));
        // untouched endpoints keep their defaults
        assert_eq!(config.sources.leads.path, "/api/leads");
        assert_eq!(config.prompt.max_records_per_source, 20);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_effective_base_url_trims_slash() {
        let model = ModelConfig {
            base_url: Some("http://gpu-box:11434/".to_string()),
            ..Default::default()
        };
        assert_eq!(model.effective_base_url(), "http://gpu-box:11434");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[general]\nverbose = true\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.general.output, "insightgen_result.json");

        std::fs::write(&path, "[general\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[sources.partners]"));
        assert!(toml_str.contains("[prompt]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.sources.orders, Config::default().sources.orders);
    }
}
