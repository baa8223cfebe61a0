//! Pull request snapshot types as read from the forge.
//!
//! These are plain data: every poll fetches a fresh snapshot and nothing here is
//! persisted between runs.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CommentId, PrNumber, RepoId, Sha};

/// Labels with protocol meaning. Matched exactly (case-sensitive).
pub mod labels {
    pub const READY: &str = "ready";
    pub const SPONSOR: &str = "sponsor";
    pub const REJECTED: &str = "rejected";
    pub const INTEGRATED: &str = "integrated";
}

/// The state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
}

impl PrState {
    /// Returns true if the PR is open.
    pub fn is_open(&self) -> bool {
        matches!(self, PrState::Open)
    }
}

/// A user account on the forge.
///
/// Identity is the numeric `id`; usernames can be renamed.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct HostUser {
    pub id: u64,
    pub username: String,
    pub full_name: String,
}

impl PartialEq for HostUser {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for HostUser {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl HostUser {
    pub fn new(id: u64, username: impl Into<String>, full_name: impl Into<String>) -> Self {
        HostUser {
            id,
            username: username.into(),
            full_name: full_name.into(),
        }
    }
}

/// A pull request as currently seen on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo: RepoId,
    pub number: PrNumber,
    pub title: String,
    pub body: String,
    pub author: HostUser,
    pub state: PrState,
    pub labels: BTreeSet<String>,
    /// The current head commit of the source branch.
    pub head_sha: Sha,
    /// Fully qualified ref the head can be fetched from (e.g. `refs/pull/12/head`).
    pub head_ref: String,
    /// The target branch name (e.g. `master`).
    pub target_ref: String,
    /// The target branch head at snapshot time.
    pub target_sha: Sha,
    pub web_url: String,
    pub updated_at: DateTime<Utc>,
}

impl PullRequest {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Web link to the changed files at a given head.
    pub fn files_url(&self, head: &Sha) -> String {
        format!("{}/files/{}", self.web_url.trim_end_matches('/'), head)
    }
}

/// A general discussion comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: HostUser,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The verdict attached to a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Disapproved,
    None,
}

/// A review submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: CommentId,
    pub reviewer: HostUser,
    pub verdict: Verdict,
    pub body: Option<String>,
    /// The head the review was made against.
    pub hash: Sha,
    pub created_at: DateTime<Utc>,
}

/// An inline comment attached to a file and line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: CommentId,
    pub author: HostUser,
    pub path: String,
    pub line: u32,
    pub body: String,
    pub hash: Sha,
    pub created_at: DateTime<Utc>,
}

/// A comment made on a commit rather than a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitComment {
    pub id: CommentId,
    pub commit: Sha,
    pub author: HostUser,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A branch on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub hash: Sha,
}

impl Branch {
    /// Branches holding pull request heads rather than integrated history.
    pub fn is_pull_request_branch(&self) -> bool {
        self.name.starts_with("pr/")
    }
}
