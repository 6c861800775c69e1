//! Markdown rendering for issues and change proposals.

use crate::analysis::analyzer::truncate_changelog;
use crate::models::{Assessment, Update};

/// Changelog excerpt length inside a proposal body.
const PROPOSAL_CHANGELOG_CHARS: usize = 1000;

/// GitHub rejects issue bodies longer than this many characters.
const ISSUE_BODY_MAX_CHARS: usize = 65_536;

/// Room kept for the truncation notice.
const TRUNCATION_NOTICE_CHARS: usize = 128;

/// The part of an issue title that stays the same across re-analysis.
pub fn issue_key(update: &Update) -> String {
    format!("{} {}", update.source.repo, update.identifier)
}

/// `<glyph> [<REC>] <repo> <identifier> available`
pub fn issue_title(update: &Update, assessment: &Assessment) -> String {
    format!(
        "{} [{}] {} {} available",
        assessment.band().emoji(),
        assessment.recommendation,
        update.source.repo,
        update.identifier
    )
}

/// Render the issue body.
pub fn issue_body(update: &Update, assessment: &Assessment) -> String {
    let mut body = String::new();

    // Header
    body.push_str(&format!(
        "## {} Update Available: {}\n\n",
        assessment.band().emoji(),
        update.source.display_name()
    ));
    body.push_str(&format!("**Repository:** `{}`\n", update.source.repo));
    body.push_str(&format!("**Update Type:** {}\n", update.kind));
    body.push_str(&format!("**Current Version:** `{}`\n", update.previous_display()));
    body.push_str(&format!("**New Version:** `{}`\n", update.identifier));
    if let Some(url) = &update.url {
        body.push_str(&format!("**Source:** [View on GitHub]({})\n", url));
    }
    if let Some(ts) = update.timestamp {
        body.push_str(&format!("**Released:** {}\n", ts.format("%Y-%m-%d %H:%M UTC")));
    }

    body.push_str("\n---\n\n");
    body.push_str(&format!(
        "### {} Recommendation: **{}**\n\n",
        assessment.recommendation.emoji(),
        assessment.recommendation
    ));
    body.push_str(&format!(
        "**Priority:** {} {}/10 ({})\n",
        assessment.band().emoji(),
        assessment.priority,
        assessment.band()
    ));
    body.push_str(&format!(
        "**Breaking Changes:** {}\n\n",
        if assessment.breaking_changes { "Yes" } else { "No" }
    ));
    body.push_str(&assessment.summary);
    body.push_str("\n\n");
    if assessment.degraded {
        body.push_str("> The automated analysis response was incomplete; review manually.\n\n");
    }

    body.push_str("---\n\n");
    body.push_str("### Benefits\n");
    body.push_str(&bullets(&assessment.benefits, "No benefits listed"));
    body.push_str("\n### Potential Risks\n");
    body.push_str(&bullets(&assessment.risks, "No risks identified"));
    body.push_str("\n### Action Items\n");
    body.push_str(&checklist(&assessment.action_items, "Review update"));

    body.push_str("\n---\n\n### Changelog\n\n<details>\n<summary>View Full Changelog</summary>\n\n```\n");
    let footer = "\n```\n\n</details>\n\n---\n\n*This issue was generated automatically by depwatch.*\n";

    // The changelog gets whatever the rest of the body leaves under the limit.
    let budget = ISSUE_BODY_MAX_CHARS
        .saturating_sub(body.chars().count() + footer.chars().count() + TRUNCATION_NOTICE_CHARS);
    body.push_str(&truncate_changelog(&update.body, budget));
    body.push_str(footer);

    body
}

pub fn proposal_title(update: &Update) -> String {
    let name = update
        .source
        .repo
        .rsplit('/')
        .next()
        .unwrap_or(&update.source.repo);
    format!("chore(deps): update {} to {}", name, update.identifier)
}

pub fn proposal_body(
    update: &Update,
    assessment: &Assessment,
    changed_paths: &[String],
    related_issue: Option<u64>,
) -> String {
    let mut body = String::new();

    body.push_str("## Automated Dependency Update\n\n");
    body.push_str(&format!("**Repository:** `{}`\n", update.source.repo));
    body.push_str(&format!(
        "**Version:** `{}` -> `{}`\n",
        update.previous_display(),
        update.identifier
    ));
    if let Some(number) = related_issue {
        body.push_str(&format!("**Tracking Issue:** #{}\n", number));
    }

    body.push_str("\n## Update Analysis\n\n");
    body.push_str(&format!(
        "**Priority:** {} {}/10 ({})\n",
        assessment.band().emoji(),
        assessment.priority,
        assessment.band()
    ));
    body.push_str(&format!(
        "**Recommendation:** {} {}\n",
        assessment.recommendation.emoji(),
        assessment.recommendation
    ));
    body.push_str(&format!(
        "**Breaking Changes:** {}\n\n",
        if assessment.breaking_changes { "Yes" } else { "No" }
    ));
    body.push_str(&assessment.summary);
    body.push_str("\n\n## Files Changed\n");
    for path in changed_paths {
        body.push_str(&format!("- `{}`\n", path));
    }

    body.push_str("\n## Risks\n");
    body.push_str(&bullets(&assessment.risks, "None identified"));
    body.push_str("\n## Action Items\n");
    body.push_str(&checklist(&assessment.action_items, "Review changes"));

    let changelog: String = changelog_or_placeholder(&update.body)
        .chars()
        .take(PROPOSAL_CHANGELOG_CHARS)
        .collect();
    body.push_str(&format!("\n## Changelog\n\n```\n{}\n```\n", changelog));
    body.push_str("\n---\n\n*This pull request was generated automatically by depwatch.*\n");

    body
}

pub fn commit_message(update: &Update) -> String {
    format!(
        "chore(deps): update {} to {}",
        update.source.repo, update.identifier
    )
}

/// `update/<owner>-<repo>-<identifier>`; leading `v` dropped, dots and any
/// character git would reject become dashes.
pub fn branch_name(update: &Update) -> String {
    let repo = update.source.repo.replace('/', "-");
    let identifier = update
        .identifier
        .strip_prefix('v')
        .unwrap_or(&update.identifier);
    let identifier: String = identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("update/{}-{}", repo, identifier)
}

fn bullets(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("- {}\n", empty);
    }
    items.iter().map(|i| format!("- {}\n", i)).collect()
}

fn checklist(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("- [ ] {}\n", empty);
    }
    items.iter().map(|i| format!("- [ ] {}\n", i)).collect()
}

fn changelog_or_placeholder(body: &str) -> &str {
    let body = body.trim();
    if body.is_empty() {
        "No changelog available"
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Recommendation, UpdateKind};
    use crate::testing::{source, ts};

    fn update(identifier: &str) -> Update {
        Update {
            source: source("comfyui", "comfyanonymous/ComfyUI"),
            kind: UpdateKind::Release,
            identifier: identifier.to_string(),
            marker: identifier.to_string(),
            previous: Some("v0.3.9".to_string()),
            timestamp: Some(ts(10, 14)),
            body: "- Fixed VRAM leak".to_string(),
            url: Some("https://github.com/comfyanonymous/ComfyUI/releases/tag/v0.3.10".to_string()),
        }
    }

    fn assessment() -> Assessment {
        Assessment {
            priority: 8,
            recommendation: Recommendation::Evaluate,
            breaking_changes: true,
            summary: "Memory fixes for large models.".to_string(),
            risks: vec!["Custom nodes may break".to_string()],
            benefits: vec![],
            action_items: vec!["Test SDXL workflow".to_string()],
            degraded: false,
        }
    }

    #[test]
    fn test_issue_title() {
        assert_eq!(
            issue_title(&update("v0.3.10"), &assessment()),
            "⚠️ [EVALUATE] comfyanonymous/ComfyUI v0.3.10 available"
        );
    }

    #[test]
    fn test_issue_body_sections() {
        let body = issue_body(&update("v0.3.10"), &assessment());
        assert!(body.contains("**Current Version:** `v0.3.9`"));
        assert!(body.contains("**New Version:** `v0.3.10`"));
        assert!(body.contains("**Released:** 2026-10-10 14:00 UTC"));
        assert!(body.contains("### 🔍 Recommendation: **EVALUATE**"));
        assert!(body.contains("**Priority:** ⚠️ 8/10 (High)"));
        assert!(body.contains("**Breaking Changes:** Yes"));
        assert!(body.contains("- No benefits listed"));
        assert!(body.contains("- Custom nodes may break"));
        assert!(body.contains("- [ ] Test SDXL workflow"));
        assert!(body.contains("<details>"));
        assert!(body.contains("- Fixed VRAM leak"));
    }

    #[test]
    fn test_issue_body_caps_large_changelog() {
        let mut big = update("v0.3.10");
        big.body = "x".repeat(70_000);
        let body = issue_body(&big, &assessment());
        assert!(body.chars().count() <= ISSUE_BODY_MAX_CHARS);
        assert!(body.contains("[... changelog truncated: showing"));
        assert!(body.contains("of 70000 characters]"));
        assert!(body.ends_with("generated automatically by depwatch.*\n"));

        let small = issue_body(&update("v0.3.10"), &assessment());
        assert!(!small.contains("changelog truncated"));
    }

    #[test]
    fn test_branch_name() {
        assert_eq!(
            branch_name(&update("v0.3.10")),
            "update/comfyanonymous-ComfyUI-0-3-10"
        );
        assert_eq!(
            branch_name(&update("release 1.2~rc")),
            "update/comfyanonymous-ComfyUI-release-1-2-rc"
        );
    }

    #[test]
    fn test_proposal_text() {
        let update = update("v0.3.10");
        assert_eq!(proposal_title(&update), "chore(deps): update ComfyUI to v0.3.10");

        let body = proposal_body(&update, &assessment(), &["Dockerfile".to_string()], Some(12));
        assert!(body.contains("`v0.3.9` -> `v0.3.10`"));
        assert!(body.contains("**Tracking Issue:** #12"));
        assert!(body.contains("- `Dockerfile`"));
    }
}
