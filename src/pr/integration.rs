//! Squash, rebase, check and push a pull request onto its target branch.
//!
//! Shared by the `integrate` and `sponsor` commands. Policy decisions (who may
//! integrate) are made by the callers; this module only does the git work.

use std::path::Path;

use tracing::info;

use crate::forge::Forge;
use crate::git::push::push_with_rebase;
use crate::git::{CommitIdentity, GitError, GitRepository, RemoteRef, Repository};
use crate::types::{PullRequest, Sha};
use crate::work::WorkError;

use super::reply::Reply;

/// Validation the project runs on a change before it is pushed.
pub trait ChangeValidator: Send + Sync {
    /// Human-readable violations in `commit`; empty means the change passes.
    fn validate(
        &self,
        repo: &GitRepository,
        commit: &Sha,
        pr: &PullRequest,
    ) -> Result<Vec<String>, WorkError>;
}

/// How an integration attempt ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationOutcome {
    Pushed { hash: Sha, rebase_message: Option<String> },
    RebaseFailed { message: String },
    CheckFailed { violations: Vec<String> },
    NoChanges,
}

/// One integration of a pull request.
pub struct Integration<'a> {
    pub forge: &'a dyn Forge,
    pub validator: &'a dyn ChangeValidator,
    pub pr: &'a PullRequest,
    pub author: CommitIdentity,
    pub committer: CommitIdentity,
}

impl Integration<'_> {
    /// Runs in a fresh repository at `path`.
    pub fn run(&self, path: &Path) -> Result<IntegrationOutcome, WorkError> {
        let pr = self.pr;
        let url = self.forge.repository_url(&pr.repo)?;
        let repo = GitRepository::init(path)?;

        let head = repo.fetch(&url, &pr.head_ref)?;
        let target_ref = format!("refs/heads/{}", pr.target_ref);
        let target = repo.fetch(&url, &target_ref)?;
        let base = repo.merge_base(&head, &target)?;
        let local = repo.squash(&head, &base, &pr.title, &self.author, &self.committer)?;

        let (rebased, rebase_message) = if base == target {
            (local, None)
        } else {
            match repo.rebase(&target, &self.committer) {
                Ok(rebased) => (
                    rebased,
                    Some("Your commit was automatically rebased without conflicts.".to_string()),
                ),
                Err(GitError::RebaseConflict { .. }) => {
                    return Ok(IntegrationOutcome::RebaseFailed {
                        message: format!(
                            "It was not possible to rebase your changes automatically. \
                             Please merge `{}` into your branch, and try again.",
                            pr.target_ref
                        ),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let violations = self.validator.validate(&repo, &rebased, pr)?;
        if !violations.is_empty() {
            return Ok(IntegrationOutcome::CheckFailed { violations });
        }

        if rebased == target || repo.changed_files(&target, &rebased)?.is_empty() {
            return Ok(IntegrationOutcome::NoChanges);
        }

        let remote = RemoteRef::new(url, pr.target_ref.clone());
        let hash = push_with_rebase(&repo, &remote, &self.committer, rebased)?;
        info!(repo = %pr.repo, pr = %pr.number, hash = %hash, "Integrated pull request");
        Ok(IntegrationOutcome::Pushed {
            hash,
            rebase_message,
        })
    }
}

/// Writes the user-facing text for `outcome`. Returns the pushed hash, if any.
pub fn report(outcome: IntegrationOutcome, reply: &mut Reply) -> Option<Sha> {
    match outcome {
        IntegrationOutcome::Pushed {
            hash,
            rebase_message,
        } => {
            if let Some(message) = rebase_message {
                reply.line(message);
            }
            reply.line(format!("Pushed as commit {}.", hash));
            Some(hash)
        }
        IntegrationOutcome::RebaseFailed { message } => {
            reply.line(message);
            None
        }
        IntegrationOutcome::CheckFailed { violations } => {
            reply.line(
                "Your merge request cannot be fulfilled at this time, as your changes \
                 failed the final check:",
            );
            for violation in violations {
                reply.line(format!(" * {}", violation));
            }
            None
        }
        IntegrationOutcome::NoChanges => {
            reply.line(
                "Warning! This commit did not result in any changes! No push attempt will be made.",
            );
            None
        }
    }
}
