//! Publishing to downstream repositories.
//!
//! The notifier files one issue per target repository and, when asked,
//! opens a change proposal that rewrites version tokens in the target's
//! files. Every call is scoped to a single repository so one failing
//! target never affects another.

pub mod edits;
pub mod render;

use crate::error::PlatformError;
use crate::github::{ChangeProposal, CreatedItem, FileEdit, HostingPlatform};
use crate::models::{Assessment, Update};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful issue post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Created(CreatedItem),
    /// An open issue for the same update was found instead.
    AlreadyExists(CreatedItem),
}

impl IssueOutcome {
    pub fn item(&self) -> &CreatedItem {
        match self {
            IssueOutcome::Created(item) | IssueOutcome::AlreadyExists(item) => item,
        }
    }
}

/// Result of a change-proposal attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    Opened(CreatedItem),
    /// Nothing to propose; the reason is reported in the run summary.
    Skipped(String),
}

pub struct Notifier {
    platform: Arc<dyn HostingPlatform>,
    skip_existing_issues: bool,
}

impl Notifier {
    pub fn new(platform: Arc<dyn HostingPlatform>, skip_existing_issues: bool) -> Self {
        Self {
            platform,
            skip_existing_issues,
        }
    }

    /// File an issue describing `update` in `repository`.
    pub async fn post_issue(
        &self,
        repository: &str,
        update: &Update,
        assessment: &Assessment,
        labels: &[String],
    ) -> Result<IssueOutcome, PlatformError> {
        let title = render::issue_title(update, assessment);

        if self.skip_existing_issues {
            let key = render::issue_key(update);
            if let Some(existing) = self.platform.find_open_issue(repository, &key).await? {
                info!("Issue already open in {}: {}", repository, existing.url);
                return Ok(IssueOutcome::AlreadyExists(existing));
            }
        }

        let body = render::issue_body(update, assessment);
        let created = self
            .platform
            .create_issue(repository, &title, &body, labels)
            .await?;

        info!("Created issue #{} in {}: {}", created.number, repository, title);
        Ok(IssueOutcome::Created(created))
    }

    /// Open a change proposal in `repository` applying the source's edit rules.
    ///
    /// Returns `Skipped` when the source has no rules or no rule changes a
    /// file on the default branch.
    pub async fn open_change_proposal(
        &self,
        repository: &str,
        update: &Update,
        assessment: &Assessment,
        related_issue: Option<u64>,
    ) -> Result<ProposalOutcome, PlatformError> {
        let rules = &update.source.edit_rules;
        if rules.is_empty() {
            return Ok(ProposalOutcome::Skipped(format!(
                "source {} has no edit rules",
                update.source.id
            )));
        }

        let base_branch = self.platform.default_branch(repository).await?;
        let mut edited: Vec<FileEdit> = Vec::new();

        for rule in rules {
            let current = match edited.iter().find(|e| e.path == rule.path) {
                Some(edit) => Some(edit.content.clone()),
                None => {
                    self.platform
                        .fetch_file(repository, &rule.path, &base_branch)
                        .await?
                }
            };

            let Some(content) = current else {
                warn!("{} not found in {}, skipping edit rule", rule.path, repository);
                continue;
            };

            let value = edits::format_value(update, rule.value);
            match edits::replace_after_prefix(&content, &rule.prefix, &value) {
                Some(new_content) => {
                    debug!(path = %rule.path, %value, "edit rule applied");
                    match edited.iter_mut().find(|e| e.path == rule.path) {
                        Some(edit) => edit.content = new_content,
                        None => edited.push(FileEdit {
                            path: rule.path.clone(),
                            content: new_content,
                        }),
                    }
                }
                None => debug!(path = %rule.path, prefix = %rule.prefix, "edit rule changed nothing"),
            }
        }

        if edited.is_empty() {
            return Ok(ProposalOutcome::Skipped(format!(
                "no edit rule changed any file in {}",
                repository
            )));
        }

        let changed_paths: Vec<String> = edited.iter().map(|e| e.path.clone()).collect();
        let proposal = ChangeProposal {
            branch: render::branch_name(update),
            base_branch,
            commit_message: render::commit_message(update),
            edits: edited,
            title: render::proposal_title(update),
            body: render::proposal_body(update, assessment, &changed_paths, related_issue),
        };

        let created = self
            .platform
            .create_change_proposal(repository, &proposal)
            .await?;
        info!(
            "Opened change proposal #{} in {} on {}",
            created.number, repository, proposal.branch
        );
        Ok(ProposalOutcome::Opened(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditRule, EditValue, Recommendation, UpdateKind};
    use crate::testing::{source, FakePlatform};

    const TARGET: &str = "acme/deploy";

    fn update() -> Update {
        let mut src = source("comfyui", "comfyanonymous/ComfyUI");
        src.edit_rules = vec![
            EditRule {
                path: "Dockerfile".to_string(),
                prefix: "COMFYUI_VERSION=".to_string(),
                value: EditValue::Full,
            },
            EditRule {
                path: "Dockerfile".to_string(),
                prefix: "COMFYUI_PLAIN=".to_string(),
                value: EditValue::StripV,
            },
            EditRule {
                path: "missing.txt".to_string(),
                prefix: "X=".to_string(),
                value: EditValue::Full,
            },
        ];
        Update {
            source: src,
            kind: UpdateKind::Release,
            identifier: "v0.3.10".to_string(),
            marker: "v0.3.10".to_string(),
            previous: Some("v0.3.9".to_string()),
            timestamp: None,
            body: "notes".to_string(),
            url: None,
        }
    }

    fn assessment() -> Assessment {
        Assessment {
            priority: 7,
            recommendation: Recommendation::Update,
            breaking_changes: false,
            summary: "Fixes".to_string(),
            risks: vec![],
            benefits: vec![],
            action_items: vec![],
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_post_issue() {
        let platform = Arc::new(FakePlatform::new());
        let notifier = Notifier::new(platform.clone(), false);
        let labels = vec!["dependencies".to_string()];

        let outcome = notifier
            .post_issue(TARGET, &update(), &assessment(), &labels)
            .await
            .unwrap();
        assert!(matches!(outcome, IssueOutcome::Created(_)));

        let issues = platform.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].repo, TARGET);
        assert_eq!(issues[0].title, "⚠️ [UPDATE] comfyanonymous/ComfyUI v0.3.10 available");
        assert_eq!(issues[0].labels, labels);
    }

    #[tokio::test]
    async fn test_post_issue_skips_existing_when_enabled() {
        let platform = Arc::new(FakePlatform::new());
        let dedup = Notifier::new(platform.clone(), true);
        let plain = Notifier::new(platform.clone(), false);

        dedup.post_issue(TARGET, &update(), &assessment(), &[]).await.unwrap();
        let second = dedup.post_issue(TARGET, &update(), &assessment(), &[]).await.unwrap();
        assert!(matches!(second, IssueOutcome::AlreadyExists(_)));
        assert_eq!(platform.issues().len(), 1);

        plain.post_issue(TARGET, &update(), &assessment(), &[]).await.unwrap();
        assert_eq!(platform.issues().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_issue_found_after_reassessment() {
        let platform = Arc::new(FakePlatform::new());
        let notifier = Notifier::new(platform.clone(), true);

        notifier
            .post_issue(TARGET, &update(), &assessment(), &[])
            .await
            .unwrap();

        let reassessed = Assessment {
            priority: 9,
            recommendation: Recommendation::Evaluate,
            ..assessment()
        };
        assert_ne!(
            render::issue_title(&update(), &reassessed),
            render::issue_title(&update(), &assessment())
        );

        let second = notifier
            .post_issue(TARGET, &update(), &reassessed, &[])
            .await
            .unwrap();
        assert!(matches!(second, IssueOutcome::AlreadyExists(ref item) if item.number == 1));
        assert_eq!(platform.issues().len(), 1);

        let mut newer = update();
        newer.identifier = "v0.3.10.1".to_string();
        let third = notifier
            .post_issue(TARGET, &newer, &assessment(), &[])
            .await
            .unwrap();
        assert!(matches!(third, IssueOutcome::Created(_)));
    }

    #[tokio::test]
    async fn test_post_issue_failure_is_returned() {
        let platform = Arc::new(FakePlatform::new());
        platform.fail_issues_for(
            TARGET,
            PlatformError::Auth {
                endpoint: "/repos/acme/deploy/issues".into(),
                status: 403,
            },
        );
        let notifier = Notifier::new(platform, false);
        let err = notifier
            .post_issue(TARGET, &update(), &assessment(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Auth { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_change_proposal_applies_rules() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_file(
            TARGET,
            "Dockerfile",
            "ARG COMFYUI_VERSION=v0.3.9\nENV COMFYUI_PLAIN=0.3.9\n",
        );
        let notifier = Notifier::new(platform.clone(), false);

        let outcome = notifier
            .open_change_proposal(TARGET, &update(), &assessment(), Some(4))
            .await
            .unwrap();
        assert!(matches!(outcome, ProposalOutcome::Opened(_)));

        let proposals = platform.proposals();
        assert_eq!(proposals.len(), 1);
        let (repo, proposal) = &proposals[0];
        assert_eq!(repo, TARGET);
        assert_eq!(proposal.branch, "update/comfyanonymous-ComfyUI-0-3-10");
        assert_eq!(proposal.base_branch, "main");
        assert_eq!(proposal.edits.len(), 1);
        assert_eq!(
            proposal.edits[0].content,
            "ARG COMFYUI_VERSION=v0.3.10\nENV COMFYUI_PLAIN=0.3.10\n"
        );
        assert!(proposal.body.contains("#4"));
    }

    #[tokio::test]
    async fn test_change_proposal_skipped_without_changes() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_file(TARGET, "Dockerfile", "ARG COMFYUI_VERSION=v0.3.10\n");
        let notifier = Notifier::new(platform.clone(), false);

        let outcome = notifier
            .open_change_proposal(TARGET, &update(), &assessment(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, ProposalOutcome::Skipped(_)));
        assert!(platform.proposals().is_empty());

        let mut bare = update();
        bare.source.edit_rules.clear();
        let outcome = notifier
            .open_change_proposal(TARGET, &bare, &assessment(), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProposalOutcome::Skipped("source comfyui has no edit rules".to_string())
        );
    }
}
