//! Upstream change detection.
//!
//! For each watch-kind of a source the scanner lists upstream items and
//! compares them with the stored marker. Listings arrive newest first; the
//! scanner returns updates oldest first so markers can advance in order.

use crate::error::PlatformError;
use crate::github::{CommitItem, HostingPlatform};
use crate::models::{Source, Update, UpdateKind, WatchKind};
use crate::state::StateStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of scanning one source.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// New updates in chronological order per kind.
    pub updates: Vec<Update>,
    /// Kinds whose listing failed. Their markers must stay put.
    pub errors: Vec<(WatchKind, PlatformError)>,
}

/// Detects new upstream events for configured sources.
pub struct SourceScanner {
    platform: Arc<dyn HostingPlatform>,
    commit_window: Duration,
}

impl SourceScanner {
    pub fn new(platform: Arc<dyn HostingPlatform>, commit_window_days: i64) -> Self {
        Self {
            platform,
            commit_window: Duration::days(commit_window_days),
        }
    }

    /// Scan every watch-kind of `source`.
    ///
    /// A failing kind is reported in [`ScanOutcome::errors`] and does not
    /// stop the remaining kinds.
    pub async fn scan(&self, source: &Source, state: &StateStore, now: DateTime<Utc>) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for kind in WatchKind::ALL {
            if !source.watches(kind) {
                continue;
            }

            let marker = state.get(&source.id, kind);
            let result = match kind {
                WatchKind::Releases => self.scan_releases(source, marker).await,
                WatchKind::Tags => self.scan_tags(source, marker).await,
                WatchKind::Commits => self.scan_commits(source, marker, now).await,
            };

            match result {
                Ok(updates) => {
                    debug!(source = %source.id, %kind, count = updates.len(), "scanned");
                    outcome.updates.extend(updates);
                }
                Err(e) => {
                    warn!(source = %source.id, %kind, error = %e, "Scan failed");
                    outcome.errors.push((kind, e));
                }
            }
        }

        if !outcome.updates.is_empty() {
            info!(
                "Found {} new update(s) for {}",
                outcome.updates.len(),
                source.display_name()
            );
        }
        outcome
    }

    async fn scan_releases(
        &self,
        source: &Source,
        marker: Option<&str>,
    ) -> Result<Vec<Update>, PlatformError> {
        let releases = self.platform.list_releases(&source.repo).await?;
        let eligible: Vec<_> = releases
            .into_iter()
            .filter(|r| !r.draft && (source.include_prereleases || !r.prerelease))
            .collect();

        let fresh = unseen(&eligible, marker, |r| r.tag.as_str());
        let mut previous = marker.map(String::from);

        Ok(fresh
            .iter()
            .rev()
            .map(|release| Update {
                source: source.clone(),
                kind: UpdateKind::Release,
                identifier: release.tag.clone(),
                marker: release.tag.clone(),
                previous: previous.replace(release.tag.clone()),
                timestamp: release.published_at,
                body: release.body.clone(),
                url: release.url.clone(),
            })
            .collect())
    }

    async fn scan_tags(
        &self,
        source: &Source,
        marker: Option<&str>,
    ) -> Result<Vec<Update>, PlatformError> {
        let tags = self.platform.list_tags(&source.repo).await?;
        let fresh = unseen(&tags, marker, |t| t.name.as_str());
        let mut previous = marker.map(String::from);

        Ok(fresh
            .iter()
            .rev()
            .map(|tag| Update {
                source: source.clone(),
                kind: UpdateKind::Tag,
                identifier: tag.name.clone(),
                marker: tag.name.clone(),
                previous: previous.replace(tag.name.clone()),
                timestamp: None,
                body: format!("Tag {} points at commit {}", tag.name, short(&tag.sha)),
                url: None,
            })
            .collect())
    }

    /// All unseen commits inside the window become a single batch.
    async fn scan_commits(
        &self,
        source: &Source,
        marker: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Update>, PlatformError> {
        let since = now
            .checked_sub_signed(self.commit_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let commits = self.platform.list_commits(&source.repo, since).await?;

        let fresh: &[CommitItem] = match marker.and_then(|m| commits.iter().position(|c| c.sha == m)) {
            Some(pos) => &commits[..pos],
            None => &commits,
        };

        let Some(newest) = fresh.first() else {
            return Ok(vec![]);
        };

        let body = fresh
            .iter()
            .map(|c| format!("- {} {}", c.short_sha(), c.headline()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(vec![Update {
            source: source.clone(),
            kind: UpdateKind::CommitBatch,
            identifier: newest.short_sha().to_string(),
            marker: newest.sha.clone(),
            previous: marker.map(|m| short(m).to_string()),
            timestamp: newest.date,
            body,
            url: newest.url.clone(),
        }])
    }
}

/// Items newer than `marker` in a newest-first listing.
///
/// Without a marker, or when the marker is no longer listed, only the newest
/// item counts as new.
fn unseen<'a, T>(items: &'a [T], marker: Option<&str>, key: impl Fn(&T) -> &str) -> &'a [T] {
    match marker.and_then(|m| items.iter().position(|item| key(item) == m)) {
        Some(pos) => &items[..pos],
        None => &items[..items.len().min(1)],
    }
}

fn short(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
