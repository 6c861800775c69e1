//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `.depwatch.toml` files.

use crate::models::{PriorityBand, Recommendation, Source};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".depwatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Analysis service settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Hosting platform settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Notification thresholds.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Label mapping rules.
    #[serde(default)]
    pub labels: LabelConfig,

    /// Downstream repositories that receive issues and proposals.
    #[serde(default)]
    pub target_repos: Vec<String>,

    /// Upstream sources to watch.
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the persisted state file.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Number of sources processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// File the run summary is also written to. `--output` overrides it.
    #[serde(default)]
    pub summary_output: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            concurrency: default_concurrency(),
            summary_output: None,
        }
    }
}

fn default_state_file() -> String {
    ".depwatch_state.json".to_string()
}

fn default_concurrency() -> usize {
    1
}

/// Which analysis service API to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    Ollama,
}

/// Analysis service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Base URL of the service. Defaults depend on the provider.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Changelog text beyond this many characters is cut before prompting.
    #[serde(default = "default_max_changelog_chars")]
    pub max_changelog_chars: usize,

    /// Upper bound for one analysis including all retries.
    #[serde(default = "default_ceiling")]
    pub ceiling_seconds: u64,

    /// Free-text description of the downstream deployment, added to prompts.
    #[serde(default)]
    pub context: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_url: None,
            name: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_model_timeout(),
            retries: default_retries(),
            max_changelog_chars: default_max_changelog_chars(),
            ceiling_seconds: default_ceiling(),
            context: None,
        }
    }
}

impl ModelConfig {
    /// Service base URL, falling back to the provider default.
    pub fn effective_api_url(&self) -> String {
        match (&self.api_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Provider::Anthropic) => "https://api.anthropic.com".to_string(),
            (None, Provider::Ollama) => "http://localhost:11434".to_string(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_model_timeout() -> u64 {
    120
}

fn default_retries() -> usize {
    2
}

fn default_max_changelog_chars() -> usize {
    8000
}

fn default_ceiling() -> u64 {
    600
}

/// Hosting platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,

    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Page size for release/tag/commit listings.
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Search for an open issue with the same title before filing.
    #[serde(default)]
    pub skip_existing_issues: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api(),
            timeout_seconds: default_github_timeout(),
            retries: default_retries(),
            per_page: default_per_page(),
            skip_existing_issues: false,
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout() -> u64 {
    15
}

fn default_per_page() -> u32 {
    30
}

/// Thresholds gating notifications and proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_min_priority_notify")]
    pub min_priority_notify: u8,

    #[serde(default = "default_min_priority_pr")]
    pub min_priority_pr: u8,

    #[serde(default)]
    pub auto_create_pr: bool,

    /// How far back commit scans look.
    #[serde(default = "default_commit_window_days")]
    pub commit_window_days: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            min_priority_notify: default_min_priority_notify(),
            min_priority_pr: default_min_priority_pr(),
            auto_create_pr: false,
            commit_window_days: default_commit_window_days(),
        }
    }
}

fn default_min_priority_notify() -> u8 {
    4
}

fn default_min_priority_pr() -> u8 {
    6
}

fn default_commit_window_days() -> i64 {
    7
}

/// Longest commit window accepted by validation.
pub const MAX_COMMIT_WINDOW_DAYS: i64 = 365;

/// Label mapping rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Labels applied to every issue.
    #[serde(default = "default_base_labels")]
    pub base: Vec<String>,

    /// Label per priority band, keyed by lowercase band name.
    #[serde(default = "default_band_labels")]
    pub bands: BTreeMap<String, String>,

    /// Label per recommendation.
    #[serde(default = "default_recommendation_labels")]
    pub recommendations: BTreeMap<String, String>,

    /// Prefix for the source's component tag.
    #[serde(default = "default_component_prefix")]
    pub component_prefix: String,

    /// Applied when the assessment reports breaking changes.
    #[serde(default = "default_breaking_label")]
    pub breaking: Option<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            base: default_base_labels(),
            bands: default_band_labels(),
            recommendations: default_recommendation_labels(),
            component_prefix: default_component_prefix(),
            breaking: default_breaking_label(),
        }
    }
}

impl LabelConfig {
    pub fn band_label(&self, band: PriorityBand) -> Option<&str> {
        self.bands
            .get(&band.to_string().to_lowercase())
            .map(String::as_str)
    }

    pub fn recommendation_label(&self, recommendation: Recommendation) -> Option<&str> {
        self.recommendations
            .get(&recommendation.to_string())
            .map(String::as_str)
    }
}

fn default_base_labels() -> Vec<String> {
    vec!["maintenance-agent".to_string(), "dependencies".to_string()]
}

fn default_band_labels() -> BTreeMap<String, String> {
    [
        ("low", "priority:low"),
        ("medium", "priority:medium"),
        ("high", "priority:high"),
        ("critical", "priority:critical"),
    ]
    .into_iter()
    .map(|(band, label)| (band.to_string(), label.to_string()))
    .collect()
}

fn default_recommendation_labels() -> BTreeMap<String, String> {
    [
        ("UPDATE", "enhancement"),
        ("EVALUATE", "needs-testing"),
        ("BLOCK", "blocked"),
    ]
    .into_iter()
    .map(|(rec, label)| (rec.to_string(), label.to_string()))
    .collect()
}

fn default_component_prefix() -> String {
    "component:".to_string()
}

fn default_breaking_label() -> Option<String> {
    Some("breaking-change".to_string())
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
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref state) = args.state {
            self.general.state_file = state.display().to_string();
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.auto_create_pr {
            self.monitoring.auto_create_pr = true;
        }
        if !args.source.is_empty() {
            self.sources.retain(|s| args.source.contains(&s.id));
        }
    }

    /// Target repositories for a source, honoring its override list.
    pub fn targets_for<'a>(&'a self, source: &'a Source) -> &'a [String] {
        source.targets.as_deref().unwrap_or(&self.target_repos)
    }

    /// Check the configuration for errors that make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("No sources configured");
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                bail!("Duplicate source id: {}", source.id);
            }
            if source.id.trim().is_empty() {
                bail!("Source for {} has an empty id", source.repo);
            }
            validate_repo_path(&source.repo)
                .with_context(|| format!("Invalid repository for source {}", source.id))?;
            if source.watch.is_empty() {
                bail!("Source {} watches nothing", source.id);
            }

            let targets = self.targets_for(source);
            if targets.is_empty() {
                bail!("No target repositories configured for source {}", source.id);
            }
            for target in targets {
                validate_repo_path(target)
                    .with_context(|| format!("Invalid target repository for source {}", source.id))?;
            }
        }

        for target in &self.target_repos {
            validate_repo_path(target).context("Invalid target repository")?;
        }

        if self.monitoring.min_priority_notify > 10 || self.monitoring.min_priority_pr > 10 {
            bail!("Priority thresholds must be between 0 and 10");
        }
        if !(1..=MAX_COMMIT_WINDOW_DAYS).contains(&self.monitoring.commit_window_days) {
            bail!(
                "commit_window_days must be between 1 and {}",
                MAX_COMMIT_WINDOW_DAYS
            );
        }
        if self.general.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }
        if self.model.timeout_seconds == 0 || self.github.timeout_seconds == 0 {
            bail!("Timeouts must be at least 1 second");
        }
        if self.model.max_changelog_chars == 0 {
            bail!("max_changelog_chars must be at least 1");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.target_repos = vec!["your-org/your-deployment".to_string()];
        config.sources = vec![Source {
            id: "comfyui".to_string(),
            repo: "comfyanonymous/ComfyUI".to_string(),
            name: Some("ComfyUI".to_string()),
            watch: vec![
                crate::models::WatchKind::Releases,
                crate::models::WatchKind::Commits,
            ],
            component: Some("comfyui".to_string()),
            include_prereleases: false,
            targets: None,
            edit_rules: vec![crate::models::EditRule {
                path: "Dockerfile".to_string(),
                prefix: "COMFYUI_VERSION=".to_string(),
                value: crate::models::EditValue::Full,
            }],
        }];
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

fn validate_repo_path(repo: &str) -> Result<()> {
    let mut parts = repo.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => bail!("'{}' is not of the form owner/name", repo),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditValue, WatchKind};

    fn parse(toml_content: &str) -> Config {
        toml::from_str(toml_content).unwrap()
    }

    const SAMPLE: &str = r#"
target_repos = ["acme/deploy"]

[general]
state_file = "state/agent.json"
concurrency = 2

[model]
provider = "ollama"
name = "llama3.2:latest"
temperature = 0.2

[monitoring]
min_priority_notify = 5
auto_create_pr = true

[[sources]]
id = "comfyui"
repo = "comfyanonymous/ComfyUI"
watch = ["releases", "commits"]
component = "comfyui"

[[sources.edit_rules]]
path = "Dockerfile"
prefix = "COMFYUI_COMMIT="
value = "short-sha"

[[sources]]
id = "torch"
repo = "pytorch/pytorch"
targets = ["acme/ml-image"]
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.monitoring.min_priority_notify, 4);
        assert_eq!(config.monitoring.min_priority_pr, 6);
        assert!(!config.monitoring.auto_create_pr);
        assert_eq!(config.monitoring.commit_window_days, 7);
        assert_eq!(config.general.concurrency, 1);
        assert_eq!(config.model.provider, Provider::Anthropic);
        assert_eq!(
            config.labels.band_label(PriorityBand::Critical),
            Some("priority:critical")
        );
    }

    #[test]
    fn test_parse_config() {
        let config = parse(SAMPLE);
        assert_eq!(config.general.state_file, "state/agent.json");
        assert_eq!(config.general.concurrency, 2);
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.effective_api_url(), "http://localhost:11434");
        assert_eq!(config.model.max_tokens, 1000);
        assert_eq!(config.monitoring.min_priority_notify, 5);
        assert_eq!(config.monitoring.min_priority_pr, 6);
        assert!(config.monitoring.auto_create_pr);

        let comfy = &config.sources[0];
        assert_eq!(comfy.watch, vec![WatchKind::Releases, WatchKind::Commits]);
        assert_eq!(comfy.edit_rules[0].value, EditValue::ShortSha);
        assert_eq!(config.targets_for(comfy), ["acme/deploy".to_string()]);
        assert_eq!(
            config.targets_for(&config.sources[1]),
            ["acme/ml-image".to_string()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_repos() {
        let mut config = parse(SAMPLE);
        config.sources[1].id = "comfyui".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(SAMPLE);
        config.sources[0].repo = "not-a-path".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(SAMPLE);
        config.sources[0].watch.clear();
        assert!(config.validate().is_err());

        let mut config = parse(SAMPLE);
        config.monitoring.min_priority_pr = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_commit_window() {
        let mut config = parse(SAMPLE);
        config.monitoring.commit_window_days = 0;
        assert!(config.validate().is_err());

        config.monitoring.commit_window_days = 1_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("commit_window_days"));

        config.monitoring.commit_window_days = MAX_COMMIT_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_targets() {
        let mut config = parse(SAMPLE);
        config.target_repos.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("comfyui"));
    }

    #[test]
    fn test_recommendation_labels() {
        let labels = LabelConfig::default();
        assert_eq!(labels.recommendation_label(Recommendation::Block), Some("blocked"));
        assert_eq!(labels.recommendation_label(Recommendation::Ignore), None);
    }

    #[test]
    fn test_default_toml_round_trips() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[monitoring]"));
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_ok());
    }
}
