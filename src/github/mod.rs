//! Hosting platform access.
//!
//! The pipeline talks to the platform only through [`HostingPlatform`], so
//! scanning and notification can be exercised against fakes.

pub mod client;

pub use client::GitHubClient;

use crate::error::PlatformError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A published release, newest first in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseItem {
    pub tag: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
}

/// A tag, newest first in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagItem {
    pub name: String,
    pub sha: String,
}

/// A commit, newest first in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitItem {
    pub sha: String,
    pub message: String,
    pub date: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

impl CommitItem {
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(7)]
    }

    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// Reference to an issue or pull request that was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedItem {
    pub number: u64,
    pub url: String,
}

/// A full-content file replacement inside a change proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

/// Everything needed to open a change proposal.
#[derive(Debug, Clone)]
pub struct ChangeProposal {
    pub branch: String,
    pub base_branch: String,
    pub commit_message: String,
    pub edits: Vec<FileEdit>,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait HostingPlatform: Send + Sync {
    async fn list_releases(&self, repo: &str) -> Result<Vec<ReleaseItem>, PlatformError>;

    async fn list_tags(&self, repo: &str) -> Result<Vec<TagItem>, PlatformError>;

    async fn list_commits(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, PlatformError>;

    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedItem, PlatformError>;

    /// Find an open issue whose title mentions `key` (see [`title_mentions`]).
    async fn find_open_issue(
        &self,
        repo: &str,
        key: &str,
    ) -> Result<Option<CreatedItem>, PlatformError>;

    async fn default_branch(&self, repo: &str) -> Result<String, PlatformError>;

    /// Raw file content at `git_ref`, or `None` when the file does not exist.
    async fn fetch_file(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, PlatformError>;

    async fn create_change_proposal(
        &self,
        repo: &str,
        proposal: &ChangeProposal,
    ) -> Result<CreatedItem, PlatformError>;
}

/// Case-insensitive check that `key` appears in `title` as whole words.
///
/// Keys look like `owner/name v2.0`; `owner/name v2.0.1` does not match.
pub fn title_mentions(title: &str, key: &str) -> bool {
    let title = title.to_lowercase();
    let key = key.to_lowercase();
    if key.is_empty() {
        return false;
    }
    title.match_indices(&key).any(|(start, _)| {
        let before = title[..start].chars().next_back();
        let after = title[start + key.len()..].chars().next();
        before.map_or(true, char::is_whitespace) && after.map_or(true, char::is_whitespace)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_helpers() {
        let commit = CommitItem {
            sha: "0123456789abcdef".into(),
            message: "Fix CUDA init\n\nLonger body".into(),
            date: None,
            url: None,
        };
        assert_eq!(commit.short_sha(), "0123456");
        assert_eq!(commit.headline(), "Fix CUDA init");

        let short = CommitItem {
            sha: "abc".into(),
            message: String::new(),
            date: None,
            url: None,
        };
        assert_eq!(short.short_sha(), "abc");
        assert_eq!(short.headline(), "");
    }

    #[test]
    fn test_title_mentions() {
        let key = "comfyanonymous/ComfyUI v2.0";
        assert!(title_mentions("⚠️ [UPDATE] comfyanonymous/ComfyUI v2.0 available", key));
        assert!(title_mentions("🚨 [EVALUATE] COMFYANONYMOUS/comfyui V2.0 available", key));
        assert!(!title_mentions("⚠️ [UPDATE] comfyanonymous/ComfyUI v2.0.1 available", key));
        assert!(!title_mentions("⚠️ [UPDATE] xcomfyanonymous/ComfyUI v2.0 available", key));
        assert!(!title_mentions("anything", ""));
    }
}

