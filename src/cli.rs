//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::Provider;
use clap::Parser;
use std::path::PathBuf;

/// Insightgen - ask business questions, get dashboard widgets
///
/// Gathers leads, partners, products and orders from the business API,
/// asks a generative model to answer the question, and returns typed
/// widgets (cards, charts, tables) for the dashboard.
///
/// Examples:
///   insightgen --question "vendas dos últimos 6 meses" --user-id 12
///   insightgen --question "top 5 produtos" --provider ollama --model llama3.2:latest
///   insightgen --question "top 5 produtos" --dry-run
///   insightgen --serve --bind 0.0.0.0:8080
///   insightgen --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Question to analyze
    #[arg(
        long,
        value_name = "TEXT",
        required_unless_present_any = ["serve", "init_config"]
    )]
    pub question: Option<String>,

    /// Actor id used to scope the data sources (anonymous when omitted)
    #[arg(short, long, value_name = "ID")]
    pub user_id: Option<i64>,

    /// Run the HTTP server instead of a one-shot analysis
    #[arg(long, conflicts_with_all = ["question", "dry_run"])]
    pub serve: bool,

    /// Address for the HTTP server
    #[arg(long, value_name = "ADDR", env = "INSIGHTGEN_BIND")]
    pub bind: Option<String>,

    /// Generation backend
    #[arg(long, value_name = "PROVIDER", env = "INSIGHTGEN_PROVIDER")]
    pub provider: Option<Provider>,

    /// Model name
    #[arg(short, long, env = "INSIGHTGEN_MODEL")]
    pub model: Option<String>,

    /// Base URL of the generation backend
    #[arg(long, value_name = "URL", env = "INSIGHTGEN_MODEL_URL")]
    pub model_url: Option<String>,

    /// Temperature for model responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Generation timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Base URL of the business API
    #[arg(long, value_name = "URL", env = "INSIGHTGEN_SOURCES_URL")]
    pub sources_url: Option<String>,

    /// Per-source timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub source_timeout: Option<u64>,

    /// Records per source included in the prompt
    #[arg(long, value_name = "COUNT")]
    pub max_records: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .insightgen.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file for the one-shot result (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: gather data and print the prompt without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .insightgen.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref question) = self.question {
            if question.trim().is_empty() {
                return Err("Question must not be empty".to_string());
            }
        }

        for url in [&self.model_url, &self.sources_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with 'http://' or 'https://': {}", url));
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.timeout == Some(0) || self.source_timeout == Some(0) {
            return Err("Timeouts must be at least 1 second".to_string());
        }

        if self.max_records == Some(0) {
            return Err("Max records must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
