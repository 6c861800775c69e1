//! depwatch - upstream update watcher
//!
//! Scans upstream repositories for new releases, tags and commits, has each
//! update assessed by an analysis service, and files issues (optionally
//! change proposals) in downstream repositories.
//!
//! Exit codes:
//!   0 - Run completed (individual failures are listed in the summary)
//!   1 - Invalid configuration, corrupt state file, or state could not be saved

mod analysis;
mod cli;
mod config;
mod error;
mod github;
mod models;
mod notifier;
mod orchestrator;
mod planner;
mod report;
mod retry;
mod scanner;
mod state;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use github::GitHubClient;
use orchestrator::Orchestrator;
use state::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

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

    // Initialize logging
    init_logging(&args);

    info!("depwatch v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        config = ?args.config,
        dry_run = args.dry_run,
        sources = ?args.source,
        "arguments"
    );

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .depwatch.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to add sources, target repositories and thresholds.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// One complete run. Any error returned here exits with status 1.
async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    let state_path = PathBuf::from(&config.general.state_file);
    let mut state = StateStore::load(&state_path)?;
    debug!("Using state file {}", state.path().display());

    let platform = Arc::new(
        GitHubClient::new(&config.github, args.github_token.as_deref())
            .context("Failed to create GitHub client")?,
    );
    let analysis = analysis::service::from_config(&config.model, args.anthropic_api_key.as_deref())?;

    if args.dry_run {
        println!("🔍 Dry run: nothing will be published and state stays unchanged.");
    }

    let orchestrator = Orchestrator::new(config.clone(), platform, analysis)
        .dry_run(args.dry_run)
        .show_progress(!args.quiet);
    let summary = orchestrator.run(&mut state, Utc::now()).await;

    let rendered = match args.format {
        OutputFormat::Json => report::generate_json_report(&summary)?,
        OutputFormat::Markdown => report::generate_markdown_report(&summary),
    };
    println!("{}", rendered);

    let output = args
        .output
        .clone()
        .or_else(|| config.general.summary_output.as_ref().map(PathBuf::from));
    if let Some(path) = output {
        report::write_report(&rendered, &path)?;
        info!("Summary written to {}", path.display());
    }

    if !args.dry_run && state.is_dirty() {
        state.flush()?;
    }

    info!(
        "Run complete: {} found, {} notified, {} proposed, {} failure(s)",
        summary.total_found(),
        summary.total_notified(),
        summary.total_proposed(),
        summary.total_failures()
    );
    Ok(())
}

/// Load configuration from the explicit path or the default location.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
