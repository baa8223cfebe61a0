//! Units of schedulable work and their conflict model.
//!
//! A [`WorkItem`] carries an identity, a conflict predicate derived from that
//! identity alone, a blocking `run` and a failure hook. Bots emit items on every
//! poll; nothing is queued durably, so a dropped item is rediscovered next cycle.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::email::MailError;
use crate::forge::ForgeError;
use crate::git::GitError;
use crate::git::push::PushError;
use crate::types::{CommentId, PrNumber, RepoId};

/// What a work item does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Mirror a pull request into the mail archive.
    Archive,
    /// Answer slash commands on a pull request.
    PullRequestCommands,
    /// Discover new commit comments on a repository.
    CommitComments,
    /// Handle one commit comment.
    CommitCommand,
}

impl WorkKind {
    /// Kinds where two items on the same subject must not overlap.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, WorkKind::Archive | WorkKind::PullRequestCommands)
    }
}

/// The entity a work item operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkSubject {
    PullRequest { repo: RepoId, pr: PrNumber },
    Repository(RepoId),
    CommitComment { repo: RepoId, id: CommentId },
}

impl fmt::Display for WorkSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkSubject::PullRequest { repo, pr } => write!(f, "{}{}", repo, pr),
            WorkSubject::Repository(repo) => write!(f, "{}", repo),
            WorkSubject::CommitComment { repo, id } => write!(f, "{}@comment-{}", repo, id),
        }
    }
}

/// Identity of a work item: (subject, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkIdentity {
    pub kind: WorkKind,
    pub subject: WorkSubject,
}

impl WorkIdentity {
    pub fn new(kind: WorkKind, subject: WorkSubject) -> Self {
        WorkIdentity { kind, subject }
    }

    pub fn pull_request(kind: WorkKind, repo: RepoId, pr: PrNumber) -> Self {
        Self::new(kind, WorkSubject::PullRequest { repo, pr })
    }

    /// Two items conflict iff they share an exclusive kind and the same subject.
    ///
    /// Symmetric, and decided from identity alone.
    pub fn conflicts_with(&self, other: &WorkIdentity) -> bool {
        self.kind == other.kind && self.kind.is_exclusive() && self.subject == other.subject
    }
}

impl fmt::Display for WorkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.subject)
    }
}

/// Errors a work item run can end with.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// More than one archived thread for a pull request.
    #[error("archive for {repo}{pr} holds {threads} conversations, expected at most one")]
    ArchiveCorrupted {
        repo: RepoId,
        pr: PrNumber,
        threads: usize,
    },

    /// The work item panicked.
    #[error("work item panicked: {0}")]
    Panicked(String),
}

impl WorkError {
    /// Data-integrity faults need an operator; retrying will not help.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, WorkError::ArchiveCorrupted { .. })
    }

    /// Whether re-running on the next poll may succeed without new activity.
    ///
    /// Integrity faults and permanent forge rejections are not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkError::ArchiveCorrupted { .. } => false,
            WorkError::Forge(e) => e.is_transient(),
            _ => true,
        }
    }
}

/// What a successful run produced.
#[derive(Default)]
pub struct WorkOutcome {
    /// Items to schedule after this one.
    pub follow_ups: Vec<Box<dyn WorkItem>>,

    /// Earliest instant a re-run is useful, when work was deferred.
    pub retry_at: Option<DateTime<Utc>>,
}

impl WorkOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn retry_at(at: DateTime<Utc>) -> Self {
        WorkOutcome {
            retry_at: Some(at),
            ..Self::default()
        }
    }

    pub fn with_follow_ups(follow_ups: Vec<Box<dyn WorkItem>>) -> Self {
        WorkOutcome {
            follow_ups,
            ..Self::default()
        }
    }
}

impl fmt::Debug for WorkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkOutcome")
            .field("follow_ups", &self.follow_ups.len())
            .field("retry_at", &self.retry_at)
            .finish()
    }
}

/// A unit of schedulable work.
pub trait WorkItem: Send + Sync + fmt::Display {
    fn identity(&self) -> WorkIdentity;

    /// True if this item may run at the same time as `other`.
    fn concurrent_with(&self, other: &dyn WorkItem) -> bool {
        !self.identity().conflicts_with(&other.identity())
    }

    /// Runs to completion on a blocking thread with a private scratch directory.
    fn run(&self, scratch: &Path) -> Result<WorkOutcome, WorkError>;

    /// Called by the runner before the failed item is dropped.
    fn handle_failure(&self, _error: &WorkError) {}
}
