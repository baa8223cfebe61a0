//! Optimistic publication to a shared remote branch.
//!
//! Many writers append to the same remote without a lock. A writer builds its
//! commit locally, then tries to push; if someone else got there first it fetches
//! the new remote head, rebases its local commits onto it and tries again. The
//! number of attempts is bounded so sustained contention fails the run instead of
//! retrying forever.

use thiserror::Error;
use tracing::{info, warn};

use crate::types::Sha;

use super::{CommitIdentity, GitError, GitResult, RemoteRef, Repository};

/// Attempts made before giving up on a push.
pub const MAX_PUSH_ATTEMPTS: u32 = 3;

/// Errors from the push/rebase loop.
#[derive(Debug, Error)]
pub enum PushError {
    /// Building the local commit failed; nothing was pushed.
    #[error("failed to build commit: {0}")]
    Build(#[source] GitError),

    /// Fetching or rebasing onto the new remote head failed.
    #[error("failed to catch up with {refname}: {source}")]
    CatchUp {
        refname: String,
        #[source]
        source: GitError,
    },

    /// Every push attempt was rejected or failed.
    #[error("push to {refname} failed after {attempts} attempts: {last}")]
    Exhausted {
        refname: String,
        attempts: u32,
        #[source]
        last: GitError,
    },
}

/// Builds a commit with `build`, then publishes it with [`push_with_rebase`].
///
/// Returns the hash that ended up on the remote, which differs from the built
/// commit when a rebase was needed.
pub fn commit_and_push<R, F>(
    repo: &R,
    remote: &RemoteRef,
    identity: &CommitIdentity,
    build: F,
) -> Result<Sha, PushError>
where
    R: Repository + ?Sized,
    F: FnOnce(&R) -> GitResult<Sha>,
{
    let head = build(repo).map_err(PushError::Build)?;
    push_with_rebase(repo, remote, identity, head)
}

/// Pushes `head` to `remote`, rebasing onto the remote head between attempts.
///
/// Rebases use `identity` as committer. After the last failed attempt no fetch
/// is made; the last push error is returned.
pub fn push_with_rebase<R>(
    repo: &R,
    remote: &RemoteRef,
    identity: &CommitIdentity,
    mut head: Sha,
) -> Result<Sha, PushError>
where
    R: Repository + ?Sized,
{
    let refname = remote.refname();
    let mut attempt = 1;
    loop {
        match repo.push(&head, &remote.url, &refname) {
            Ok(()) => {
                if attempt > 1 {
                    info!(refname = %refname, head = %head, attempt, "Push succeeded after rebase");
                }
                return Ok(head);
            }
            Err(e) if attempt >= MAX_PUSH_ATTEMPTS => {
                warn!(refname = %refname, attempts = attempt, error = %e, "Giving up on push");
                return Err(PushError::Exhausted {
                    refname,
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                info!(
                    refname = %refname,
                    attempt,
                    error = %e,
                    "Push failed, fetching and rebasing"
                );
                let catch_up = |source| PushError::CatchUp {
                    refname: refname.clone(),
                    source,
                };
                let upstream = repo.fetch(&remote.url, &refname).map_err(catch_up)?;
                head = repo.rebase(&upstream, identity).map_err(catch_up)?;
                attempt += 1;
            }
        }
    }
}
