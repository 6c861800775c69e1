//! In-memory fakes of the hosting platform and the analysis service.

use crate::analysis::AnalysisService;
use crate::error::{AnalysisError, PlatformError};
use crate::github::{
    title_mentions, ChangeProposal, CommitItem, CreatedItem, HostingPlatform, ReleaseItem, TagItem,
};
use crate::models::{Source, WatchKind};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
}

pub fn source(id: &str, repo: &str) -> Source {
    Source {
        id: id.to_string(),
        repo: repo.to_string(),
        name: None,
        watch: vec![WatchKind::Releases],
        component: None,
        include_prereleases: false,
        targets: None,
        edit_rules: vec![],
    }
}

pub fn release(tag: &str, day: u32) -> ReleaseItem {
    ReleaseItem {
        tag: tag.to_string(),
        body: format!("Changes in {}", tag),
        published_at: Some(ts(day, 12)),
        url: Some(format!("https://github.example/releases/{}", tag)),
        draft: false,
        prerelease: false,
    }
}

pub fn commit(sha: &str, message: &str, day: u32) -> CommitItem {
    CommitItem {
        sha: sha.to_string(),
        message: message.to_string(),
        date: Some(ts(day, 12)),
        url: None,
    }
}

/// An issue recorded by [`FakePlatform`].
#[derive(Debug, Clone)]
pub struct FiledIssue {
    pub repo: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Default)]
struct PlatformInner {
    releases: HashMap<String, Vec<ReleaseItem>>,
    tags: HashMap<String, Vec<TagItem>>,
    commits: HashMap<String, Vec<CommitItem>>,
    files: HashMap<(String, String), String>,
    failing_issue_repos: HashMap<String, PlatformError>,
    failing_listings: HashSet<(String, WatchKind)>,
    issues: Vec<FiledIssue>,
    proposals: Vec<(String, ChangeProposal)>,
    commit_queries: Vec<(String, DateTime<Utc>)>,
}

/// Hosting platform backed by in-memory listings.
#[derive(Default)]
pub struct FakePlatform {
    inner: Mutex<PlatformInner>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases are stored newest first, as the platform lists them.
    pub fn set_releases(&self, repo: &str, releases: Vec<ReleaseItem>) {
        self.inner
            .lock()
            .unwrap()
            .releases
            .insert(repo.to_string(), releases);
    }

    pub fn set_tags(&self, repo: &str, tags: Vec<TagItem>) {
        self.inner.lock().unwrap().tags.insert(repo.to_string(), tags);
    }

    pub fn set_commits(&self, repo: &str, commits: Vec<CommitItem>) {
        self.inner
            .lock()
            .unwrap()
            .commits
            .insert(repo.to_string(), commits);
    }

    pub fn set_file(&self, repo: &str, path: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert((repo.to_string(), path.to_string()), content.to_string());
    }

    pub fn fail_issues_for(&self, repo: &str, error: PlatformError) {
        self.inner
            .lock()
            .unwrap()
            .failing_issue_repos
            .insert(repo.to_string(), error);
    }

    pub fn clear_issue_failures(&self) {
        self.inner.lock().unwrap().failing_issue_repos.clear();
    }

    pub fn fail_listing(&self, repo: &str, kind: WatchKind) {
        self.inner
            .lock()
            .unwrap()
            .failing_listings
            .insert((repo.to_string(), kind));
    }

    pub fn issues(&self) -> Vec<FiledIssue> {
        self.inner.lock().unwrap().issues.clone()
    }

    pub fn proposals(&self) -> Vec<(String, ChangeProposal)> {
        self.inner.lock().unwrap().proposals.clone()
    }

    pub fn commit_queries(&self) -> Vec<(String, DateTime<Utc>)> {
        self.inner.lock().unwrap().commit_queries.clone()
    }

    fn check_listing(&self, repo: &str, kind: WatchKind) -> Result<(), PlatformError> {
        if self
            .inner
            .lock()
            .unwrap()
            .failing_listings
            .contains(&(repo.to_string(), kind))
        {
            return Err(PlatformError::Transient {
                endpoint: format!("/repos/{}/{}", repo, kind),
                message: "listing unavailable".to_string(),
                retry_after: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HostingPlatform for FakePlatform {
    async fn list_releases(&self, repo: &str) -> Result<Vec<ReleaseItem>, PlatformError> {
        self.check_listing(repo, WatchKind::Releases)?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .releases
            .get(repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<TagItem>, PlatformError> {
        self.check_listing(repo, WatchKind::Tags)?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tags
            .get(repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_commits(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, PlatformError> {
        self.check_listing(repo, WatchKind::Commits)?;
        let mut inner = self.inner.lock().unwrap();
        inner.commit_queries.push((repo.to_string(), since));
        Ok(inner
            .commits
            .get(repo)
            .map(|commits| {
                commits
                    .iter()
                    .filter(|c| c.date.map_or(true, |d| d >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedItem, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.failing_issue_repos.get(repo) {
            return Err(err.clone());
        }
        inner.issues.push(FiledIssue {
            repo: repo.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.to_vec(),
        });
        let number = inner.issues.len() as u64;
        Ok(CreatedItem {
            number,
            url: format!("https://github.example/{}/issues/{}", repo, number),
        })
    }

    async fn find_open_issue(
        &self,
        repo: &str,
        key: &str,
    ) -> Result<Option<CreatedItem>, PlatformError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .issues
            .iter()
            .position(|i| i.repo == repo && title_mentions(&i.title, key))
            .map(|idx| CreatedItem {
                number: idx as u64 + 1,
                url: format!("https://github.example/{}/issues/{}", repo, idx + 1),
            }))
    }

    async fn default_branch(&self, _repo: &str) -> Result<String, PlatformError> {
        Ok("main".to_string())
    }

    async fn fetch_file(
        &self,
        repo: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>, PlatformError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .files
            .get(&(repo.to_string(), path.to_string()))
            .cloned())
    }

    async fn create_change_proposal(
        &self,
        repo: &str,
        proposal: &ChangeProposal,
    ) -> Result<CreatedItem, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.proposals.push((repo.to_string(), proposal.clone()));
        let number = 100 + inner.proposals.len() as u64;
        Ok(CreatedItem {
            number,
            url: format!("https://github.example/{}/pull/{}", repo, number),
        })
    }
}

/// Analysis service that replays queued responses.
///
/// When the queue is empty the default response is returned.
pub struct FakeAnalysis {
    queue: Mutex<VecDeque<Result<String, AnalysisError>>>,
    default: Result<String, AnalysisError>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl FakeAnalysis {
    pub fn replying(text: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: Ok(text.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            default: Err(error),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: Result<String, AnalysisError>) {
        self.queue.lock().unwrap().push_back(response);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for FakeAnalysis {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, AnalysisError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.default.clone())
    }
}

/// JSON reply an analysis service would give.
pub fn assessment_json(priority: u8, recommendation: &str) -> String {
    format!(
        r#"{{"priority": {}, "recommendation": "{}", "breaking_changes": false, "summary": "Routine update", "risks": ["Minor regressions"], "benefits": ["Bug fixes"], "action_items": ["Rebuild image"]}}"#,
        priority, recommendation
    )
}
