//! Run summary rendering.
//!
//! This module renders the [`RunSummary`] of a run as Markdown or JSON.

use crate::models::{RunSummary, SourceReport};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Generate the Markdown run summary.
pub fn generate_markdown_report(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str("# depwatch Run Summary\n\n");
    output.push_str(&generate_metadata_section(summary));
    output.push_str(&generate_totals_section(summary));

    for source in &summary.sources {
        output.push_str(&generate_source_section(source));
    }

    output.push_str(&generate_failures_section(summary));
    output
}

fn generate_metadata_section(summary: &RunSummary) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "- **Started:** {}\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Duration:** {:.1}s\n", summary.duration_seconds));
    if summary.dry_run {
        section.push_str("- **Mode:** dry run (nothing published, state unchanged)\n");
    }
    section.push('\n');

    section
}

fn generate_totals_section(summary: &RunSummary) -> String {
    let mut section = String::new();

    section.push_str("## Totals\n\n");
    section.push_str("| Source | Found | Notified | Proposed | Skipped | Degraded | Failures |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    for source in &summary.sources {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} | {} |\n",
            source.source_id,
            source.found,
            source.notified,
            source.proposed,
            source.skipped,
            source.degraded,
            source.failures.len()
        ));
    }
    section.push_str(&format!(
        "| **Total** | **{}** | **{}** | **{}** | | | **{}** |\n\n",
        summary.total_found(),
        summary.total_notified(),
        summary.total_proposed(),
        summary.total_failures()
    ));

    section
}

fn generate_source_section(source: &SourceReport) -> String {
    if source.links.is_empty() && source.notes.is_empty() {
        return String::new();
    }

    let mut section = format!("### {} (`{}`)\n\n", source.source_id, source.repo);
    for link in &source.links {
        section.push_str(&format!("- {}\n", link));
    }
    for note in &source.notes {
        section.push_str(&format!("- _{}_\n", note));
    }
    section.push('\n');
    section
}

fn generate_failures_section(summary: &RunSummary) -> String {
    if summary.total_failures() == 0 {
        return "No failures.\n".to_string();
    }

    let mut section = String::new();
    section.push_str("## Failures\n\n");
    section.push_str("| Source | Stage | Update | Repository | Message |\n");
    section.push_str("|:---|:---|:---|:---|:---|\n");

    for source in &summary.sources {
        for failure in &source.failures {
            section.push_str(&format!(
                "| `{}` | {} | {} | {} | {} |\n",
                source.source_id,
                failure.stage,
                failure.update.as_deref().unwrap_or("-"),
                failure.repository.as_deref().unwrap_or("-"),
                failure.message.replace('|', "\\|").replace('\n', " ")
            ));
        }
    }
    section.push('\n');
    section
}

/// Generate the JSON run summary.
pub fn generate_json_report(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}

/// Write rendered output to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
