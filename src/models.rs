//! Data models for the update watcher.
//!
//! This module contains the core records that flow through the pipeline:
//! configured sources, detected updates, assessments, action decisions and
//! the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of upstream signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    Releases,
    Tags,
    Commits,
}

impl WatchKind {
    pub const ALL: [WatchKind; 3] = [WatchKind::Releases, WatchKind::Tags, WatchKind::Commits];
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchKind::Releases => write!(f, "releases"),
            WatchKind::Tags => write!(f, "tags"),
            WatchKind::Commits => write!(f, "commits"),
        }
    }
}

/// How a single file token is rewritten for a change proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditValue {
    /// The identifier as published.
    #[default]
    Full,
    /// First 7 characters, leading `v` removed.
    ShortSha,
    /// Identifier with a leading `v` removed.
    StripV,
}

/// A file edit to apply when proposing a change for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRule {
    /// Path of the file inside the target repository.
    pub path: String,
    /// Text that precedes the version token, e.g. `COMFYUI_COMMIT=`.
    pub prefix: String,
    #[serde(default)]
    pub value: EditValue,
}

/// An upstream project being watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique key used in the state file.
    pub id: String,
    /// Repository path in `owner/name` form.
    pub repo: String,
    /// Human-readable name; falls back to the repository path.
    #[serde(default)]
    pub name: Option<String>,
    /// Signals to watch.
    #[serde(default = "default_watch")]
    pub watch: Vec<WatchKind>,
    /// Component tag used for labelling.
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub include_prereleases: bool,
    /// Overrides the global target repository list.
    #[serde(default)]
    pub targets: Option<Vec<String>>,
    /// File edits used when opening change proposals.
    #[serde(default)]
    pub edit_rules: Vec<EditRule>,
}

fn default_watch() -> Vec<WatchKind> {
    vec![WatchKind::Releases]
}

impl Source {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.repo)
    }

    pub fn watches(&self, kind: WatchKind) -> bool {
        self.watch.contains(&kind)
    }
}

/// Kind of a detected update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    Release,
    Tag,
    CommitBatch,
}

impl UpdateKind {
    /// The watch-kind whose marker this update advances.
    pub fn watch_kind(&self) -> WatchKind {
        match self {
            UpdateKind::Release => WatchKind::Releases,
            UpdateKind::Tag => WatchKind::Tags,
            UpdateKind::CommitBatch => WatchKind::Commits,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateKind::Release => write!(f, "release"),
            UpdateKind::Tag => write!(f, "tag"),
            UpdateKind::CommitBatch => write!(f, "commits"),
        }
    }
}

/// One detected upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub source: Source,
    pub kind: UpdateKind,
    /// Release tag, tag name, or short SHA of the newest commit.
    pub identifier: String,
    /// Value stored in the state file once this update is handled.
    pub marker: String,
    /// Marker stored before this run, if any.
    pub previous: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Changelog, or a synthesized commit summary.
    pub body: String,
    pub url: Option<String>,
}

impl Update {
    /// Previous identifier for display.
    pub fn previous_display(&self) -> &str {
        self.previous.as_deref().unwrap_or("unknown")
    }
}

/// Recommended course of action for an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Update,
    Evaluate,
    Block,
    Ignore,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Update => write!(f, "UPDATE"),
            Recommendation::Evaluate => write!(f, "EVALUATE"),
            Recommendation::Block => write!(f, "BLOCK"),
            Recommendation::Ignore => write!(f, "IGNORE"),
        }
    }
}

impl Recommendation {
    /// Parse case-insensitively; unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "UPDATE" => Some(Recommendation::Update),
            "EVALUATE" => Some(Recommendation::Evaluate),
            "BLOCK" => Some(Recommendation::Block),
            "IGNORE" => Some(Recommendation::Ignore),
            _ => None,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Recommendation::Update => "✅",
            Recommendation::Evaluate => "🔍",
            Recommendation::Block => "🛑",
            Recommendation::Ignore => "⏭️",
        }
    }
}

/// Priority band derived from a 0-10 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBand {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityBand {
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0..=3 => PriorityBand::Low,
            4..=6 => PriorityBand::Medium,
            7..=8 => PriorityBand::High,
            _ => PriorityBand::Critical,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            PriorityBand::Low => "ℹ️",
            PriorityBand::Medium => "💡",
            PriorityBand::High => "⚠️",
            PriorityBand::Critical => "🚨",
        }
    }
}

impl fmt::Display for PriorityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityBand::Low => write!(f, "Low"),
            PriorityBand::Medium => write!(f, "Medium"),
            PriorityBand::High => write!(f, "High"),
            PriorityBand::Critical => write!(f, "Critical"),
        }
    }
}

/// Analysis result for one update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Always within 0..=10.
    pub priority: u8,
    pub recommendation: Recommendation,
    pub breaking_changes: bool,
    pub summary: String,
    pub risks: Vec<String>,
    pub benefits: Vec<String>,
    pub action_items: Vec<String>,
    /// Set when the service response had to be repaired.
    #[serde(default)]
    pub degraded: bool,
}

impl Assessment {
    pub fn band(&self) -> PriorityBand {
        PriorityBand::from_priority(self.priority)
    }
}

/// Outcome of planning for one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDecision {
    pub should_notify: bool,
    pub should_propose_change: bool,
    pub targets: Vec<String>,
    pub labels: Vec<String>,
}

impl ActionDecision {
    pub fn noop() -> Self {
        Self::default()
    }
}

/// A failure recorded in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Pipeline stage: scan, analysis, issue, proposal.
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub message: String,
}

/// Per-source results of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    pub repo: String,
    pub found: usize,
    pub notified: usize,
    pub proposed: usize,
    pub skipped: usize,
    pub degraded: usize,
    /// Issue and proposal links created this run.
    pub links: Vec<String>,
    pub failures: Vec<Failure>,
    /// Informational outcomes such as skipped proposals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Marker advances to apply once the run completes.
    #[serde(skip)]
    pub advances: Vec<(WatchKind, String)>,
}

impl SourceReport {
    pub fn new(source: &Source) -> Self {
        Self {
            source_id: source.id.clone(),
            repo: source.repo.clone(),
            ..Self::default()
        }
    }

    pub fn fail(
        &mut self,
        stage: &str,
        update: Option<&str>,
        repository: Option<&str>,
        message: impl Into<String>,
    ) {
        self.failures.push(Failure {
            stage: stage.to_string(),
            update: update.map(String::from),
            repository: repository.map(String::from),
            message: message.into(),
        });
    }
}

/// Summary of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub dry_run: bool,
    pub sources: Vec<SourceReport>,
}

impl RunSummary {
    pub fn total_found(&self) -> usize {
        self.sources.iter().map(|s| s.found).sum()
    }

    pub fn total_notified(&self) -> usize {
        self.sources.iter().map(|s| s.notified).sum()
    }

    pub fn total_proposed(&self) -> usize {
        self.sources.iter().map(|s| s.proposed).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.sources.iter().map(|s| s.failures.len()).sum()
    }
}
