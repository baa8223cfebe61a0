//! The forge client seam.
//!
//! The forge (pull requests, reviews, comments, labels, branches) is an external
//! collaborator. This module defines the interface the bots need and the error
//! taxonomy they use to decide whether a failure is worth retrying on a later poll.
//!
//! All calls are blocking: a WorkItem runs to completion on a blocking thread and
//! its only suspension points are calls like these.

use std::fmt;

use thiserror::Error;

use crate::types::{
    Branch, Comment, CommentId, CommitComment, HostUser, PrState, PullRequest, RepoId, Review,
    ReviewComment,
};

/// The kind of forge error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeErrorKind {
    /// Transient error: rate limits, 5xx, network timeouts.
    ///
    /// The failing WorkItem releases its dedup state so the next poll retries.
    Transient,

    /// Permanent error: missing objects, authentication failures, validation errors.
    Permanent,
}

/// A forge API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct ForgeError {
    pub kind: ForgeErrorKind,

    /// The HTTP status code, if the forge reported one.
    pub status_code: Option<u16>,

    pub message: String,
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "forge error (HTTP {}): {}", code, self.message),
            None => write!(f, "forge error: {}", self.message),
        }
    }
}

impl ForgeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ForgeErrorKind::Transient,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ForgeErrorKind::Permanent,
            status_code: None,
            message: message.into(),
        }
    }

    /// Categorizes an HTTP failure by status code.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let kind = match status_code {
            429 => ForgeErrorKind::Transient,
            code if (500..600).contains(&code) => ForgeErrorKind::Transient,
            _ => ForgeErrorKind::Permanent,
        };
        Self {
            kind,
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// Returns true if retrying on a later poll may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind == ForgeErrorKind::Transient
    }
}

/// Result type for forge operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Read accessors and mutation calls on a forge.
///
/// Implementations are shared between concurrently running WorkItems, so they
/// must be `Send + Sync`. Pull requests are identified by `pr.repo` and
/// `pr.number`; the remaining snapshot fields are not consulted by mutations.
pub trait Forge: Send + Sync {
    /// The account the bot acts as.
    fn current_user(&self) -> ForgeResult<HostUser>;

    /// All pull requests of interest in a repository (open and recently closed).
    fn pull_requests(&self, repo: &RepoId) -> ForgeResult<Vec<PullRequest>>;

    fn comments(&self, pr: &PullRequest) -> ForgeResult<Vec<Comment>>;

    fn reviews(&self, pr: &PullRequest) -> ForgeResult<Vec<Review>>;

    fn review_comments(&self, pr: &PullRequest) -> ForgeResult<Vec<ReviewComment>>;

    fn add_comment(&self, pr: &PullRequest, body: &str) -> ForgeResult<Comment>;

    fn update_comment(&self, pr: &PullRequest, id: CommentId, body: &str)
    -> ForgeResult<Comment>;

    fn set_state(&self, pr: &PullRequest, state: PrState) -> ForgeResult<()>;

    fn add_label(&self, pr: &PullRequest, label: &str) -> ForgeResult<()>;

    fn remove_label(&self, pr: &PullRequest, label: &str) -> ForgeResult<()>;

    /// Commit comments created recently; "recent" is defined by the forge.
    fn recent_commit_comments(&self, repo: &RepoId) -> ForgeResult<Vec<CommitComment>>;

    fn branches(&self, repo: &RepoId) -> ForgeResult<Vec<Branch>>;

    /// URL usable with `git fetch`/`git push` for the repository.
    fn repository_url(&self, repo: &RepoId) -> ForgeResult<String>;
}
