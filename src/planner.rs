//! Action planning.
//!
//! `plan` maps an assessment to the actions taken for an update. It is pure:
//! the same inputs always give the same decision.

use crate::config::Config;
use crate::models::{ActionDecision, Assessment, Recommendation, Update};

/// Decide what to do about one analyzed update.
///
/// | condition                                  | outcome        |
/// |--------------------------------------------|----------------|
/// | recommendation is IGNORE                   | no-op          |
/// | priority below `min_priority_notify`       | no-op          |
/// | otherwise                                  | notify targets |
///
/// A change proposal is added when `auto_create_pr` is on, the priority is
/// at least `min_priority_pr` and the recommendation is UPDATE or EVALUATE.
pub fn plan(update: &Update, assessment: &Assessment, config: &Config) -> ActionDecision {
    let monitoring = &config.monitoring;

    if assessment.recommendation == Recommendation::Ignore
        || assessment.priority < monitoring.min_priority_notify
    {
        return ActionDecision::noop();
    }

    let should_propose_change = monitoring.auto_create_pr
        && assessment.priority >= monitoring.min_priority_pr
        && matches!(
            assessment.recommendation,
            Recommendation::Update | Recommendation::Evaluate
        );

    ActionDecision {
        should_notify: true,
        should_propose_change,
        targets: config.targets_for(&update.source).to_vec(),
        labels: labels_for(update, assessment, config),
    }
}

/// Labels for an issue, in table order with duplicates removed.
pub fn labels_for(update: &Update, assessment: &Assessment, config: &Config) -> Vec<String> {
    let table = &config.labels;

    let candidates = table
        .base
        .iter()
        .cloned()
        .chain(table.band_label(assessment.band()).map(String::from))
        .chain(
            update
                .source
                .component
                .as_ref()
                .map(|tag| format!("{}{}", table.component_prefix, tag)),
        )
        .chain(
            table
                .recommendation_label(assessment.recommendation)
                .map(String::from),
        )
        .chain(
            table
                .breaking
                .clone()
                .filter(|_| assessment.breaking_changes),
        );

    let mut labels: Vec<String> = Vec::new();
    for label in candidates {
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateKind;
    use crate::testing::source;

    fn config() -> Config {
        let mut config = Config::default();
        config.target_repos = vec!["acme/deploy".to_string(), "acme/infra".to_string()];
        config
    }

    fn update() -> Update {
        let mut src = source("comfyui", "comfyanonymous/ComfyUI");
        src.component = Some("comfyui".to_string());
        Update {
            source: src,
            kind: UpdateKind::Release,
            identifier: "v2.0".to_string(),
            marker: "v2.0".to_string(),
            previous: None,
            timestamp: None,
            body: String::new(),
            url: None,
        }
    }

    fn assessment(priority: u8, recommendation: Recommendation) -> Assessment {
        Assessment {
            priority,
            recommendation,
            breaking_changes: false,
            summary: "s".to_string(),
            risks: vec![],
            benefits: vec![],
            action_items: vec![],
            degraded: false,
        }
    }

    #[test]
    fn test_ignore_is_noop_at_any_priority() {
        for priority in 0..=10 {
            let decision = plan(&update(), &assessment(priority, Recommendation::Ignore), &config());
            assert_eq!(decision, ActionDecision::noop());
        }
    }

    #[test]
    fn test_below_notify_threshold_is_noop() {
        let decision = plan(&update(), &assessment(3, Recommendation::Update), &config());
        assert!(!decision.should_notify);
        assert!(!decision.should_propose_change);

        let decision = plan(&update(), &assessment(4, Recommendation::Update), &config());
        assert!(decision.should_notify);
    }

    #[test]
    fn test_evaluate_with_auto_pr_proposes() {
        let mut config = config();
        config.monitoring.auto_create_pr = true;
        config.monitoring.min_priority_pr = 6;

        let decision = plan(&update(), &assessment(8, Recommendation::Evaluate), &config);
        assert!(decision.should_notify);
        assert!(decision.should_propose_change);
        assert_eq!(decision.targets, vec!["acme/deploy", "acme/infra"]);
    }

    #[test]
    fn test_proposal_gating() {
        let mut config = config();
        // auto_create_pr off
        let decision = plan(&update(), &assessment(9, Recommendation::Update), &config);
        assert!(!decision.should_propose_change);

        config.monitoring.auto_create_pr = true;
        let decision = plan(&update(), &assessment(5, Recommendation::Update), &config);
        assert!(decision.should_notify);
        assert!(!decision.should_propose_change);

        let decision = plan(&update(), &assessment(9, Recommendation::Block), &config);
        assert!(decision.should_notify);
        assert!(!decision.should_propose_change);
    }

    #[test]
    fn test_source_targets_override() {
        let mut update = update();
        update.source.targets = Some(vec!["acme/ml-image".to_string()]);
        let decision = plan(&update, &assessment(7, Recommendation::Update), &config());
        assert_eq!(decision.targets, vec!["acme/ml-image"]);
    }

    #[test]
    fn test_labels() {
        let mut a = assessment(9, Recommendation::Block);
        a.breaking_changes = true;
        let labels = labels_for(&update(), &a, &config());
        assert_eq!(
            labels,
            vec![
                "maintenance-agent",
                "dependencies",
                "priority:critical",
                "component:comfyui",
                "blocked",
                "breaking-change",
            ]
        );

        let mut plain = update();
        plain.source.component = None;
        let labels = labels_for(&plain, &assessment(5, Recommendation::Evaluate), &config());
        assert_eq!(
            labels,
            vec!["maintenance-agent", "dependencies", "priority:medium", "needs-testing"]
        );
    }

    #[test]
    fn test_labels_deduplicated() {
        let mut config = config();
        config.labels.base.push("enhancement".to_string());
        let labels = labels_for(&update(), &assessment(7, Recommendation::Update), &config);
        assert_eq!(labels.iter().filter(|l| *l == "enhancement").count(), 1);
        assert_eq!(labels[2], "enhancement");
    }
}
