//! Run orchestration.
//!
//! Each new update goes through analysis and planning before anything is
//! published. State markers only move for updates that were fully handled. Sources
//! run with bounded concurrency and only read the state store; advances are
//! applied afterwards by the single owner of the store.

use crate::analysis::{AnalysisService, UpdateAnalyzer};
use crate::config::Config;
use crate::github::HostingPlatform;
use crate::models::{Assessment, RunSummary, Source, SourceReport, Update, WatchKind};
use crate::notifier::{Notifier, ProposalOutcome};
use crate::planner;
use crate::scanner::SourceScanner;
use crate::state::StateStore;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: Config,
    scanner: SourceScanner,
    analyzer: UpdateAnalyzer,
    notifier: Notifier,
    dry_run: bool,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        platform: Arc<dyn HostingPlatform>,
        analysis: Arc<dyn AnalysisService>,
    ) -> Self {
        let scanner = SourceScanner::new(platform.clone(), config.monitoring.commit_window_days);
        let analyzer = UpdateAnalyzer::new(analysis, &config.model);
        let notifier = Notifier::new(platform, config.github.skip_existing_issues);

        Self {
            config,
            scanner,
            analyzer,
            notifier,
            dry_run: false,
            show_progress: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[cfg(test)]
    pub fn with_analyzer(mut self, analyzer: UpdateAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Process every configured source.
    ///
    /// Marker advances are applied to `state` unless this is a dry run. The
    /// caller flushes.
    pub async fn run(&self, state: &mut StateStore, now: DateTime<Utc>) -> RunSummary {
        let started_at = Utc::now();
        let timer = Instant::now();
        let sources = &self.config.sources;

        info!(
            "Checking {} source(s) with concurrency {}",
            sources.len(),
            self.config.general.concurrency
        );

        let pb = self.progress_bar(sources.len());

        let reports: Vec<SourceReport> = {
            let snapshot: &StateStore = state;
            let pb = &pb;
            stream::iter(sources.iter())
                .map(|source| async move {
                    let report = self.process_source(source, snapshot, now).await;
                    if let Some(pb) = pb {
                        pb.inc(1);
                    }
                    report
                })
                .buffered(self.config.general.concurrency.max(1))
                .collect()
                .await
        };

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if self.dry_run {
            info!("Dry run: state left unchanged");
        } else {
            for report in &reports {
                for (kind, marker) in &report.advances {
                    state.advance(&report.source_id, *kind, marker);
                }
            }
        }

        RunSummary {
            started_at,
            duration_seconds: timer.elapsed().as_secs_f64(),
            dry_run: self.dry_run,
            sources: reports,
        }
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.show_progress || len == 0 {
            return None;
        }

        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sources")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    }

    /// Scan, analyze and publish for one source. Never fails; problems are
    /// recorded in the report.
    async fn process_source(
        &self,
        source: &Source,
        state: &StateStore,
        now: DateTime<Utc>,
    ) -> SourceReport {
        let mut report = SourceReport::new(source);

        let outcome = self.scanner.scan(source, state, now).await;
        for (kind, error) in &outcome.errors {
            report.fail("scan", None, None, format!("{}: {}", kind, error));
        }
        report.found = outcome.updates.len();

        // Kinds whose marker must not move again this run.
        let mut blocked: HashSet<WatchKind> = HashSet::new();

        for update in &outcome.updates {
            let kind = update.kind.watch_kind();
            let handled = self.process_update(update, &mut report).await;

            if handled && !blocked.contains(&kind) {
                report.advances.retain(|(k, _)| *k != kind);
                report.advances.push((kind, update.marker.clone()));
            } else if !handled {
                debug!(source = %source.id, %kind, identifier = %update.identifier, "marker held");
                blocked.insert(kind);
            }
        }

        report
    }

    /// Returns whether the update was fully handled and its marker may advance.
    async fn process_update(&self, update: &Update, report: &mut SourceReport) -> bool {
        let assessment = match self.analyzer.analyze(update).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(
                    "Skipping notification for {} {}: {}",
                    update.source.repo, update.identifier, e
                );
                report.fail("analysis", Some(&update.identifier), None, e.to_string());
                return false;
            }
        };

        if assessment.degraded {
            report.degraded += 1;
        }

        let decision = planner::plan(update, &assessment, &self.config);
        if !decision.should_notify {
            info!(
                "No action for {} {} (priority {}, {})",
                update.source.repo, update.identifier, assessment.priority, assessment.recommendation
            );
            report.skipped += 1;
            return true;
        }

        if self.dry_run {
            info!(
                "[dry run] would notify {} for {} {} with labels [{}]{}",
                decision.targets.join(", "),
                update.source.repo,
                update.identifier,
                decision.labels.join(", "),
                if decision.should_propose_change {
                    " and propose a change"
                } else {
                    ""
                }
            );
            report.notified += 1;
            return true;
        }

        let mut all_posted = true;
        let mut any_posted = false;

        for target in &decision.targets {
            let issue_number = match self
                .notifier
                .post_issue(target, update, &assessment, &decision.labels)
                .await
            {
                Ok(outcome) => {
                    any_posted = true;
                    report.links.push(outcome.item().url.clone());
                    Some(outcome.item().number)
                }
                Err(e) => {
                    warn!("Failed to post issue to {}: {}", target, e);
                    report.fail("issue", Some(&update.identifier), Some(target), e.to_string());
                    all_posted = false;
                    None
                }
            };

            if decision.should_propose_change {
                self.propose(target, update, &assessment, issue_number, report)
                    .await;
            }
        }

        if any_posted {
            report.notified += 1;
        }
        all_posted
    }

    /// Proposal failures are reported but never hold back the marker.
    async fn propose(
        &self,
        target: &str,
        update: &Update,
        assessment: &Assessment,
        issue_number: Option<u64>,
        report: &mut SourceReport,
    ) {
        match self
            .notifier
            .open_change_proposal(target, update, assessment, issue_number)
            .await
        {
            Ok(ProposalOutcome::Opened(item)) => {
                report.proposed += 1;
                report.links.push(item.url);
            }
            Ok(ProposalOutcome::Skipped(reason)) => {
                info!("Change proposal for {} skipped: {}", target, reason);
                report.notes.push(format!(
                    "proposal for {} in {} skipped: {}",
                    update.identifier, target, reason
                ));
            }
            Err(e) => {
                warn!("Failed to open change proposal in {}: {}", target, e);
                report.fail("proposal", Some(&update.identifier), Some(target), e.to_string());
            }
        }
    }
}
