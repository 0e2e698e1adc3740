//! Insightgen - natural-language business questions to dashboard widgets
//!
//! Gathers leads, partners, products and orders from the business API,
//! asks a generative model to answer a question about them, and returns
//! validated visualization widgets. Runs once from the command line or as
//! an HTTP service for the dashboard.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, server start-up, output file, etc.)
//!   2 - The analysis came back degraded (error and no widgets)

mod analysis;
mod cli;
mod config;
mod llm;
mod models;
mod report;
mod server;
mod sources;

use analysis::{Pipeline, Preparer};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::{AnalysisRequest, Identity};
use report::{AnalysisReport, ReportMetadata};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Insightgen v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Insightgen failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .insightgen.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE_NAME);
    println!("   Edit it to point at your business API and model backend.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` takes precedence over the verbosity flags.
fn init_logging(args: &Args) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let installed = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(args.log_level()).finish())
    };

    if let Err(e) = installed {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch to server, dry-run or one-shot mode. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    if args.serve {
        let pipeline = Pipeline::from_config(&config)?;
        server::serve(pipeline, &config.server.bind).await?;
        return Ok(0);
    }

    let question = args.question.clone().unwrap_or_default();
    let identity = args.user_id.map_or(Identity::Anonymous, Identity::User);
    let request = AnalysisRequest::new(question, identity);

    if args.dry_run {
        return handle_dry_run(&config, &request).await;
    }

    run_once(&args, &config, &request).await
}

/// Run the pipeline once and write the JSON report.
async fn run_once(args: &Args, config: &Config, request: &AnalysisRequest) -> Result<i32> {
    let start_time = Instant::now();
    let pipeline = Pipeline::from_config(config)?;

    println!("❓ Question: {}", request.question);
    println!("🤖 Model: {}", pipeline.generator_label());
    println!("📡 Sources: {}", config.sources.base_url);

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Gathering data and generating widgets...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = pipeline.run_detailed(request).await;
    spinner.finish_and_clear();

    let report = AnalysisReport {
        metadata: ReportMetadata {
            question: request.question.clone(),
            model_used: pipeline.generator_label(),
            generated_at: Utc::now(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
            records: outcome.record_counts,
        },
        result: outcome.result,
    };

    let output = Path::new(&config.general.output);
    report::write_json_report(&report, output)?;

    let records = report.metadata.records;
    println!("\n📊 Analysis Summary:");
    println!(
        "   Records: {} (leads {} | partners {} | products {} | orders {})",
        records.total(),
        records.leads,
        records.partners,
        records.products,
        records.orders
    );
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);

    if let Some(ref error) = report.result.error {
        eprintln!("\n⚠️  Analysis degraded: {}", error);
        eprintln!("   Result saved to: {}", output.display());
        return Ok(2);
    }

    println!("   Widgets: {}", report.result.widgets.len());
    for line in report::summary_lines(&report) {
        println!("     • {}", line);
    }
    println!("\n✅ Analysis complete! Result saved to: {}", output.display());

    Ok(0)
}

/// Handle --dry-run: gather data, print the prompt, skip the model.
async fn handle_dry_run(config: &Config, request: &AnalysisRequest) -> Result<i32> {
    println!("\n🔍 Dry run: gathering data (no model call)...\n");

    let preparer = Preparer::from_config(config)?;
    let (context, prompt) = preparer.prepare(request).await;

    println!("{}", prompt);

    let records = context.record_counts();
    println!(
        "\n   Records gathered: {} (first {} per source included)",
        records.total(),
        preparer.max_records()
    );
    println!("   Prompt size: {} bytes", prompt.len());
    println!("\n✅ Dry run complete. No model calls were made.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
