//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// depwatch - watch upstream projects and file triaged update issues
///
/// Scans configured upstream repositories for new releases, tags and
/// commits, asks an analysis service to assess each one, and files issues
/// (and optionally change proposals) in downstream repositories.
///
/// Examples:
///   depwatch
///   depwatch --config ops/depwatch.toml --dry-run
///   depwatch --source comfyui --format json --output run.json
///   depwatch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .depwatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the state file (overrides the config file)
    #[arg(long, value_name = "FILE", env = "DEPWATCH_STATE")]
    pub state: Option<PathBuf>,

    /// Dry run: scan and analyze, but create nothing and keep state untouched
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format for the run summary (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Also write the run summary to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Token for the hosting platform API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Key for the Anthropic analysis service
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Model name (overrides the config file)
    #[arg(short, long, env = "DEPWATCH_MODEL")]
    pub model: Option<String>,

    /// Number of sources processed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Open change proposals for qualifying updates
    #[arg(long)]
    pub auto_create_pr: bool,

    /// Only process these source ids (repeatable)
    #[arg(long, value_name = "ID")]
    pub source: Vec<String>,

    /// Generate a default .depwatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(concurrency) = self.concurrency {
            if concurrency == 0 {
                return Err("Concurrency must be at least 1".to_string());
            }
        }

        if self.source.iter().any(|s| s.trim().is_empty()) {
            return Err("--source requires a non-empty id".to_string());
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

#[cfg(test)]
pub(crate) fn make_args() -> Args {
    Args {
        config: None,
        state: None,
        dry_run: false,
        verbose: false,
        quiet: false,
        format: OutputFormat::Markdown,
        output: None,
        github_token: None,
        anthropic_api_key: None,
        model: None,
        concurrency: None,
        auto_create_pr: false,
        source: vec![],
        init_config: false,
    }
}
