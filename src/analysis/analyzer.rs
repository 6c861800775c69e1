//! Update assessment.
//!
//! Builds the prompt for one update, calls the analysis service with bounded
//! retries under an overall ceiling, and turns whatever comes back into an
//! [`Assessment`]. Malformed output is repaired field by field and flagged
//! as degraded; only a failed service call is an error.

use super::service::AnalysisService;
use crate::config::ModelConfig;
use crate::error::AnalysisError;
use crate::models::{Assessment, Recommendation, Update};
use crate::retry::RetryPolicy;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// System prompt describing the expected response.
const SYSTEM_PROMPT: &str = r#"You are a maintenance agent reviewing upstream software updates for a downstream deployment.

Score each update and respond with a single JSON object, no other text:
{
  "priority": <0-10>,
  "recommendation": "<UPDATE|EVALUATE|BLOCK|IGNORE>",
  "breaking_changes": <true|false>,
  "summary": "<2-3 sentence summary>",
  "risks": ["<risk>", ...],
  "benefits": ["<benefit>", ...],
  "action_items": ["<action>", ...]
}

Priority scale:
- 0-3: minor, can wait
- 4-6: moderate, should evaluate
- 7-8: important, update soon
- 9-10: critical, update immediately

Recommendations:
- UPDATE: safe and beneficial, apply directly
- EVALUATE: needs review or testing before applying
- BLOCK: breaking or harmful, do not update yet
- IGNORE: not relevant or too minor"#;

const DEFAULT_PRIORITY: u8 = 5;

/// Assesses updates through an [`AnalysisService`].
pub struct UpdateAnalyzer {
    service: Arc<dyn AnalysisService>,
    retry: RetryPolicy,
    ceiling: Duration,
    max_changelog_chars: usize,
    context: Option<String>,
}

impl UpdateAnalyzer {
    pub fn new(service: Arc<dyn AnalysisService>, config: &ModelConfig) -> Self {
        Self {
            service,
            retry: RetryPolicy::from_retries(config.retries),
            ceiling: Duration::from_secs(config.ceiling_seconds),
            max_changelog_chars: config.max_changelog_chars,
            context: config.context.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[cfg(test)]
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Assess one update.
    ///
    /// Returns `AnalysisError::Unavailable` when the service cannot be
    /// reached within the retry budget and ceiling. Any response text at all
    /// produces an assessment.
    pub async fn analyze(&self, update: &Update) -> Result<Assessment, AnalysisError> {
        let prompt = build_prompt(update, self.context.as_deref(), self.max_changelog_chars);
        let what = format!("analyze {} {}", update.source.repo, update.identifier);

        let call = self
            .retry
            .run(&what, || self.service.complete(SYSTEM_PROMPT, &prompt));

        let raw = match tokio::time::timeout(self.ceiling, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(AnalysisError::Transient { message, .. })) => {
                return Err(AnalysisError::Unavailable(format!(
                    "gave up after {} attempts: {}",
                    self.retry.max_attempts, message
                )));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(AnalysisError::Unavailable(format!(
                    "analysis exceeded the {}s ceiling",
                    self.ceiling.as_secs()
                )));
            }
        };

        let assessment = parse_assessment(&raw);
        if assessment.degraded {
            warn!(
                repo = %update.source.repo,
                identifier = %update.identifier,
                "Analysis response was malformed, using repaired assessment"
            );
        }
        info!(
            "Analysis for {} {}: priority {}/10, recommendation {}",
            update.source.repo, update.identifier, assessment.priority, assessment.recommendation
        );
        Ok(assessment)
    }
}

/// Render the user prompt for an update.
pub fn build_prompt(update: &Update, context: Option<&str>, max_changelog_chars: usize) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("Project: {}\n", update.source.display_name()));
    prompt.push_str(&format!("Repository: {}\n", update.source.repo));
    prompt.push_str(&format!("Update kind: {}\n", update.kind));
    prompt.push_str(&format!("Current version: {}\n", update.previous_display()));
    prompt.push_str(&format!("New version: {}\n", update.identifier));
    if let Some(ts) = update.timestamp {
        prompt.push_str(&format!("Published: {}\n", ts.format("%Y-%m-%d %H:%M UTC")));
    }

    prompt.push_str("\nChangelog:\n```\n");
    prompt.push_str(&truncate_changelog(&update.body, max_changelog_chars));
    prompt.push_str("\n```\n");

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\nDeployment context:\n");
        prompt.push_str(context.trim());
        prompt.push('\n');
    }

    prompt.push_str("\nRespond with the JSON object only.");
    prompt
}

/// Cut `text` to at most `max_chars` characters, appending a notice when cut.
pub fn truncate_changelog(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "No changelog available".to_string();
    }

    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let kept: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n\n[... changelog truncated: showing {} of {} characters]",
        kept.trim_end(),
        max_chars,
        total
    )
}

/// Interpret a raw service response.
pub fn parse_assessment(raw: &str) -> Assessment {
    let Some(object) = extract_json(raw) else {
        debug!("No JSON object found in analysis response");
        let summary = raw.trim();
        return Assessment {
            priority: DEFAULT_PRIORITY,
            recommendation: Recommendation::Evaluate,
            breaking_changes: false,
            summary: if summary.is_empty() {
                "No summary available".to_string()
            } else {
                summary.to_string()
            },
            risks: vec!["Unable to analyze automatically".to_string()],
            benefits: vec![],
            action_items: vec!["Review changelog manually".to_string()],
            degraded: true,
        };
    };

    let mut degraded = false;

    let priority = match object.get("priority").and_then(priority_value) {
        Some(p) if (0.0..=10.0).contains(&p) => p as u8,
        Some(p) => {
            degraded = true;
            p.clamp(0.0, 10.0) as u8
        }
        None => {
            degraded = true;
            DEFAULT_PRIORITY
        }
    };

    let recommendation = match object
        .get("recommendation")
        .and_then(Value::as_str)
        .and_then(Recommendation::parse)
    {
        Some(rec) => rec,
        None => {
            degraded = true;
            Recommendation::Evaluate
        }
    };

    let breaking_changes = object
        .get("breaking_changes")
        .or_else(|| object.get("breaking"))
        .map(bool_value)
        .unwrap_or(false);

    let summary = match object.get("summary").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            degraded = true;
            "No summary available".to_string()
        }
    };

    Assessment {
        priority,
        recommendation,
        breaking_changes,
        summary,
        risks: string_list(object.get("risks")),
        benefits: string_list(object.get("benefits")),
        action_items: string_list(object.get("action_items")),
        degraded,
    }
}

/// Find a JSON object in the response: fenced block first, then the
/// outermost braces.
fn extract_json(raw: &str) -> Option<Map<String, Value>> {
    let candidates = [
        fenced(raw, "```json"),
        fenced(raw, "```"),
        outermost_braces(raw),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| match serde_json::from_str(candidate.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
}

fn fenced<'a>(raw: &'a str, open: &str) -> Option<&'a str> {
    let start = raw.find(open)? + open.len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

fn outermost_braces(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn priority_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().map(f64::round),
        Value::String(s) => s.trim().parse::<f64>().ok().map(f64::round),
        _ => None,
    }
}

fn bool_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => vec![],
    }
}
