//! GitHub REST API client.
//!
//! Every call carries the client timeout and goes through the shared retry
//! policy: transient failures (timeouts, 5xx, rate limits) are retried with
//! backoff, everything else is returned immediately.

use super::{
    title_mentions, ChangeProposal, CommitItem, CreatedItem, HostingPlatform, ReleaseItem, TagItem,
};
use crate::config::GitHubConfig;
use crate::error::PlatformError;
use crate::retry::{retry_after_header, RetryPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const RAW_CONTENT: &str = "application/vnd.github.raw+json";

/// GitHub API client.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    per_page: u32,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client for `config`, authenticating with `token` when given.
    pub fn new(config: &GitHubConfig, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("depwatch/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GitHub token contains invalid characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
            retry: RetryPolicy::from_retries(config.retries),
        })
    }

    /// Replace the retry policy.
    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn repo_url(&self, repo: &str, rest: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, repo, rest)
    }

    /// Send a request built by `build`, retrying transient failures.
    async fn send<F>(&self, endpoint: &str, build: F) -> Result<Response, PlatformError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.retry
            .run(endpoint, || async {
                let response = build()
                    .send()
                    .await
                    .map_err(|e| PlatformError::from_reqwest(endpoint, e))?;
                check_status(endpoint, response).await
            })
            .await
    }

    async fn send_json<T, F>(&self, endpoint: &str, build: F) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = self.send(endpoint, build).await?;
        response.json::<T>().await.map_err(|e| PlatformError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    async fn ref_sha(&self, repo: &str, branch: &str) -> Result<String, PlatformError> {
        let url = self.repo_url(repo, &format!("git/ref/heads/{}", branch));
        let reference: GhRef = self.send_json("git/ref", || self.http.get(&url)).await?;
        Ok(reference.object.sha)
    }
}

/// Map non-success statuses to a `PlatformError`.
async fn check_status(endpoint: &str, response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let headers = response.headers();
    let mut retry_after = retry_after_header(headers);

    // Primary rate limit: 403/429 with no remaining quota.
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    if exhausted && retry_after.is_none() {
        retry_after = Some(Duration::from_secs(60));
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 500 {
        let cut = (0..=500).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        body.truncate(cut);
    }

    Err(PlatformError::from_status(endpoint, status, retry_after, body))
}

// ── Response shapes ──

#[derive(Deserialize)]
struct GhRelease {
    tag_name: String,
    body: Option<String>,
    published_at: Option<DateTime<Utc>>,
    html_url: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

#[derive(Deserialize)]
struct GhTag {
    name: String,
    commit: GhSha,
}

#[derive(Deserialize)]
struct GhSha {
    sha: String,
}

#[derive(Deserialize)]
struct GhCommit {
    sha: String,
    html_url: Option<String>,
    commit: GhCommitDetail,
}

#[derive(Deserialize)]
struct GhCommitDetail {
    message: String,
    committer: Option<GhSignature>,
    author: Option<GhSignature>,
}

#[derive(Deserialize)]
struct GhSignature {
    date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct GhCreated {
    number: u64,
    html_url: String,
}

#[derive(Deserialize)]
struct GhSearch {
    items: Vec<GhSearchItem>,
}

#[derive(Deserialize)]
struct GhSearchItem {
    number: u64,
    html_url: String,
    title: String,
}

#[derive(Deserialize)]
struct GhRepo {
    default_branch: String,
}

#[derive(Deserialize)]
struct GhRef {
    object: GhSha,
}

#[derive(Deserialize)]
struct GhGitCommit {
    tree: GhSha,
}

#[async_trait]
impl HostingPlatform for GitHubClient {
    async fn list_releases(&self, repo: &str) -> Result<Vec<ReleaseItem>, PlatformError> {
        let url = self.repo_url(repo, "releases");
        let releases: Vec<GhRelease> = self
            .send_json("releases", || {
                self.http.get(&url).query(&[("per_page", self.per_page)])
            })
            .await?;

        debug!("{}: {} releases", repo, releases.len());
        Ok(releases
            .into_iter()
            .map(|r| ReleaseItem {
                tag: r.tag_name,
                body: r.body.unwrap_or_default(),
                published_at: r.published_at,
                url: r.html_url,
                draft: r.draft,
                prerelease: r.prerelease,
            })
            .collect())
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<TagItem>, PlatformError> {
        let url = self.repo_url(repo, "tags");
        let tags: Vec<GhTag> = self
            .send_json("tags", || {
                self.http.get(&url).query(&[("per_page", self.per_page)])
            })
            .await?;

        debug!("{}: {} tags", repo, tags.len());
        Ok(tags
            .into_iter()
            .map(|t| TagItem {
                name: t.name,
                sha: t.commit.sha,
            })
            .collect())
    }

    async fn list_commits(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, PlatformError> {
        let url = self.repo_url(repo, "commits");
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let commits: Vec<GhCommit> = self
            .send_json("commits", || {
                self.http.get(&url).query(&[
                    ("since", since.clone()),
                    ("per_page", self.per_page.to_string()),
                ])
            })
            .await?;

        debug!("{}: {} commits since {}", repo, commits.len(), since);
        Ok(commits
            .into_iter()
            .map(|c| {
                let date = c
                    .commit
                    .committer
                    .and_then(|s| s.date)
                    .or_else(|| c.commit.author.and_then(|s| s.date));
                CommitItem {
                    sha: c.sha,
                    message: c.commit.message,
                    date,
                    url: c.html_url,
                }
            })
            .collect())
    }

    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedItem, PlatformError> {
        let url = self.repo_url(repo, "issues");
        let payload = json!({ "title": title, "body": body, "labels": labels });
        let created: GhCreated = self
            .send_json("issues", || self.http.post(&url).json(&payload))
            .await?;

        info!("Created issue #{} in {}", created.number, repo);
        Ok(CreatedItem {
            number: created.number,
            url: created.html_url,
        })
    }

    async fn find_open_issue(
        &self,
        repo: &str,
        key: &str,
    ) -> Result<Option<CreatedItem>, PlatformError> {
        let url = format!("{}/search/issues", self.api_url);
        let terms = key.replace('"', " ");
        let query = format!("repo:{} is:issue is:open in:title \"{}\"", repo, terms.trim());
        let results: GhSearch = self
            .send_json("search/issues", || {
                self.http
                    .get(&url)
                    .query(&[("q", query.as_str()), ("per_page", "10")])
            })
            .await?;

        Ok(results
            .items
            .into_iter()
            .find(|item| title_mentions(&item.title, key))
            .map(|item| CreatedItem {
                number: item.number,
                url: item.html_url,
            }))
    }

    async fn default_branch(&self, repo: &str) -> Result<String, PlatformError> {
        let url = format!("{}/repos/{}", self.api_url, repo);
        let info: GhRepo = self.send_json("repos", || self.http.get(&url)).await?;
        Ok(info.default_branch)
    }

    async fn fetch_file(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, PlatformError> {
        let url = self.repo_url(repo, &format!("contents/{}", path));
        let result = self
            .send("contents", || {
                self.http
                    .get(&url)
                    .header(ACCEPT, RAW_CONTENT)
                    .query(&[("ref", git_ref)])
            })
            .await;

        match result {
            Ok(response) => response.text().await.map(Some).map_err(|e| {
                PlatformError::Decode {
                    endpoint: "contents".to_string(),
                    message: e.to_string(),
                }
            }),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_change_proposal(
        &self,
        repo: &str,
        proposal: &ChangeProposal,
    ) -> Result<CreatedItem, PlatformError> {
        let base_sha = self.ref_sha(repo, &proposal.base_branch).await?;

        let commit_url = self.repo_url(repo, &format!("git/commits/{}", base_sha));
        let base_commit: GhGitCommit = self
            .send_json("git/commits", || self.http.get(&commit_url))
            .await?;

        let entries: Vec<_> = proposal
            .edits
            .iter()
            .map(|edit| {
                json!({
                    "path": edit.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": edit.content,
                })
            })
            .collect();
        let tree_url = self.repo_url(repo, "git/trees");
        let tree_payload = json!({ "base_tree": base_commit.tree.sha, "tree": entries });
        let tree: GhSha = self
            .send_json("git/trees", || self.http.post(&tree_url).json(&tree_payload))
            .await?;

        let new_commit_url = self.repo_url(repo, "git/commits");
        let commit_payload = json!({
            "message": proposal.commit_message,
            "tree": tree.sha,
            "parents": [base_sha],
        });
        let commit: GhSha = self
            .send_json("git/commits", || {
                self.http.post(&new_commit_url).json(&commit_payload)
            })
            .await?;

        let refs_url = self.repo_url(repo, "git/refs");
        let ref_payload = json!({
            "ref": format!("refs/heads/{}", proposal.branch),
            "sha": commit.sha,
        });
        self.send("git/refs", || self.http.post(&refs_url).json(&ref_payload))
            .await?;

        let pulls_url = self.repo_url(repo, "pulls");
        let pull_payload = json!({
            "title": proposal.title,
            "head": proposal.branch,
            "base": proposal.base_branch,
            "body": proposal.body,
        });
        let pull: GhCreated = self
            .send_json("pulls", || self.http.post(&pulls_url).json(&pull_payload))
            .await?;

        info!("Opened pull request #{} in {}", pull.number, repo);
        Ok(CreatedItem {
            number: pull.number,
            url: pull.html_url,
        })
    }
}
