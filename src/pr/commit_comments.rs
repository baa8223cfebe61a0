//! Dispatches each new commit comment exactly once per process.
//!
//! A repository scan keeps comments on commits that landed on a real branch and
//! hands each one to its own work item. The [`ProcessedSet`] stops a comment from
//! being dispatched again while it stays "recent" on the forge; only a failed
//! dispatch releases it.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::git::{GitRepository, Repository};
use crate::types::{Branch, CommentId, CommitComment, RepoId, Sha};
use crate::work::{WorkError, WorkIdentity, WorkItem, WorkKind, WorkOutcome, WorkSubject};

use super::bot::PullRequestContext;

/// Handles one commit comment (for example, commands issued on a commit).
pub trait CommitCommandHandler: Send + Sync {
    fn handle(
        &self,
        repo: &RepoId,
        comment: &CommitComment,
        scratch: &Path,
    ) -> Result<(), WorkError>;
}

/// Commit comments dispatched during this process's lifetime.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    ids: Mutex<HashSet<(RepoId, CommentId)>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a comment processed. False if it already was.
    pub fn insert(&self, repo: &RepoId, id: CommentId) -> bool {
        self.ids.lock().insert((repo.clone(), id))
    }

    pub fn contains(&self, repo: &RepoId, id: CommentId) -> bool {
        self.ids.lock().contains(&(repo.clone(), id))
    }

    pub fn remove(&self, repo: &RepoId, id: CommentId) {
        self.ids.lock().remove(&(repo.clone(), id));
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scans a repository for new commit comments.
pub struct CommitCommentsWorkItem {
    repo: RepoId,
    context: Arc<PullRequestContext>,
}

impl CommitCommentsWorkItem {
    pub fn new(repo: RepoId, context: Arc<PullRequestContext>) -> Self {
        CommitCommentsWorkItem { repo, context }
    }
}

impl fmt::Display for CommitCommentsWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitCommentsWorkItem@{}", self.repo)
    }
}

/// True if `commit` is reachable from any of `branches`.
fn on_branch(local: &GitRepository, commit: &Sha, branches: &[Branch]) -> Result<bool, WorkError> {
    if !local.contains(commit)? {
        return Ok(false);
    }
    for branch in branches {
        if local.is_ancestor(commit, &branch.hash)? {
            return Ok(true);
        }
    }
    Ok(false)
}

impl WorkItem for CommitCommentsWorkItem {
    fn identity(&self) -> WorkIdentity {
        WorkIdentity::new(WorkKind::CommitComments, WorkSubject::Repository(self.repo.clone()))
    }

    fn run(&self, scratch: &Path) -> Result<WorkOutcome, WorkError> {
        let ctx = &self.context;
        info!(repo = %self.repo, "Looking for recent commit comments");

        let comments = ctx.forge.recent_commit_comments(&self.repo)?;
        let branches: Vec<Branch> = ctx
            .forge
            .branches(&self.repo)?
            .into_iter()
            .filter(|b| !b.is_pull_request_branch())
            .collect();

        let url = ctx.forge.repository_url(&self.repo)?;
        let local = GitRepository::init(&scratch.join("pr.commitcomments").join(self.repo.slug()))?;
        for branch in &branches {
            local.fetch(&url, &format!("refs/heads/{}", branch.name))?;
        }

        let mut follow_ups: Vec<Box<dyn WorkItem>> = Vec::new();
        for comment in comments {
            if ctx.processed.contains(&self.repo, comment.id) {
                continue;
            }
            if !on_branch(&local, &comment.commit, &branches)? {
                debug!(repo = %self.repo, comment = %comment.id, commit = %comment.commit, "Commit not on a branch");
                continue;
            }
            if !ctx.processed.insert(&self.repo, comment.id) {
                continue;
            }
            follow_ups.push(Box::new(CommitCommandWorkItem::new(
                self.repo.clone(),
                comment,
                Arc::clone(&self.context),
            )));
        }
        Ok(WorkOutcome::with_follow_ups(follow_ups))
    }
}

/// Handles a single commit comment.
pub struct CommitCommandWorkItem {
    repo: RepoId,
    comment: CommitComment,
    context: Arc<PullRequestContext>,
}

impl CommitCommandWorkItem {
    pub fn new(repo: RepoId, comment: CommitComment, context: Arc<PullRequestContext>) -> Self {
        CommitCommandWorkItem {
            repo,
            comment,
            context,
        }
    }
}

impl fmt::Display for CommitCommandWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitCommandWorkItem@{}:{}", self.repo, self.comment.id)
    }
}

impl WorkItem for CommitCommandWorkItem {
    fn identity(&self) -> WorkIdentity {
        WorkIdentity::new(
            WorkKind::CommitCommand,
            WorkSubject::CommitComment {
                repo: self.repo.clone(),
                id: self.comment.id,
            },
        )
    }

    fn run(&self, scratch: &Path) -> Result<WorkOutcome, WorkError> {
        self.context
            .commit_commands
            .handle(&self.repo, &self.comment, scratch)?;
        Ok(WorkOutcome::done())
    }

    fn handle_failure(&self, _error: &WorkError) {
        self.context.processed.remove(&self.repo, self.comment.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_first_writer_only() {
        let set = ProcessedSet::new();
        let repo = RepoId::new("openjdk", "jdk");
        assert!(set.insert(&repo, CommentId(1)));
        assert!(!set.insert(&repo, CommentId(1)));
        assert!(set.insert(&RepoId::new("openjdk", "skara"), CommentId(1)));

        set.remove(&repo, CommentId(1));
        assert!(!set.contains(&repo, CommentId(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn concurrent_inserts_have_one_winner() {
        let set = Arc::new(ProcessedSet::new());
        let repo = RepoId::new("openjdk", "jdk");
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| set.insert(&repo, CommentId(9)) as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
