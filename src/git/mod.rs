//! Local git plumbing used by the archive publisher and the sponsor integrator.
//!
//! Every run materializes its own private clone into scratch storage; nothing here
//! keeps a working tree across runs. All commands run with a clean environment
//! (no system or user config) and identities passed via `-c` flags.
//!
//! The optimistic push/rebase loop that publishes to shared remotes lives in
//! [`push`].

pub mod push;

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;
use tracing::debug;

use crate::types::Sha;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Rebase stopped on a conflict and was aborted.
    #[error("rebase conflict: {details}")]
    RebaseConflict { details: String },

    /// Push was rejected by the remote.
    #[error("push rejected: {details}")]
    PushRejected { details: String },

    /// Invalid SHA format.
    #[error("invalid SHA: {0}")]
    InvalidSha(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for creating commits.
///
/// Passed via `-c` flags so commits can be created with global and system config
/// disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,

    /// GPG signing key ID. If present, commits are signed with `-S`.
    pub signing_key: Option<String>,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        CommitIdentity {
            name: name.into(),
            email: email.into(),
            signing_key: None,
        }
    }
}

/// A branch on a remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Anything `git fetch` accepts: a URL or a local path.
    pub url: String,

    /// Branch name without the `refs/heads/` prefix.
    pub name: String,
}

impl RemoteRef {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        RemoteRef {
            url: url.into(),
            name: name.into(),
        }
    }

    /// Fully qualified ref name.
    pub fn refname(&self) -> String {
        format!("refs/heads/{}", self.name)
    }
}

/// The primitive repository operations the push/rebase loop composes.
pub trait Repository {
    fn root(&self) -> &Path;

    fn head(&self) -> GitResult<Sha>;

    /// Stages every change in the working tree.
    fn add_all(&self) -> GitResult<()>;

    /// Commits the index on top of HEAD and returns the new HEAD.
    fn commit(
        &self,
        message: &str,
        author: &CommitIdentity,
        committer: &CommitIdentity,
    ) -> GitResult<Sha>;

    /// Fetches a single ref and returns the fetched commit.
    fn fetch(&self, url: &str, refspec: &str) -> GitResult<Sha>;

    /// Pushes `hash` to the fully qualified `refname` at `url`.
    fn push(&self, hash: &Sha, url: &str, refname: &str) -> GitResult<()>;

    /// Replays local commits not reachable from `onto` on top of it.
    ///
    /// Returns the new HEAD. Commits that become empty are dropped, so a change
    /// already present upstream yields `onto` itself.
    fn rebase(&self, onto: &Sha, committer: &CommitIdentity) -> GitResult<Sha>;

    fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> GitResult<bool>;

    /// Returns true if the object database has `hash`.
    fn contains(&self, hash: &Sha) -> GitResult<bool>;
}

/// Create a git Command with clean environment (no system/user config).
pub(crate) fn git_command(workdir: &Path) -> std::process::Command {
    use std::process::Command;

    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Create a git Command configured for commit operations.
///
/// Prepends `-c user.name`, `-c user.email` and, if set, `-c user.signingkey`.
/// Callers pass `-S` themselves when signing.
pub(crate) fn git_commit_command(
    workdir: &Path,
    identity: &CommitIdentity,
) -> std::process::Command {
    let mut cmd = git_command(workdir);

    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));

    if let Some(ref key) = identity.signing_key {
        cmd.arg("-c");
        cmd.arg(format!("user.signingkey={}", key));
    }

    cmd
}

/// Run a git command in the given working directory.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;
    check_output(output, args)
}

fn check_output(output: Output, args: &[&str]) -> GitResult<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Run a git command and return stdout as a string.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check if one commit is an ancestor of another.
pub fn is_ancestor(workdir: &Path, potential_ancestor: &Sha, descendant: &Sha) -> GitResult<bool> {
    let output = git_command(workdir)
        .args([
            "merge-base",
            "--is-ancestor",
            potential_ancestor.as_str(),
            descendant.as_str(),
        ])
        .output()?;

    // Exit 0 = is ancestor, exit 1 = not ancestor, other = error
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(GitError::CommandFailed {
                command: format!(
                    "git merge-base --is-ancestor {} {}",
                    potential_ancestor, descendant
                ),
                stderr,
            })
        }
    }
}

/// Get the SHA of a revision.
pub fn rev_parse(workdir: &Path, rev: &str) -> GitResult<Sha> {
    let sha_str = run_git_stdout(workdir, &["rev-parse", rev])?;
    Sha::parse(&sha_str).map_err(|_| GitError::InvalidSha(sha_str))
}

/// Look up a branch on a remote. `None` if it does not exist.
pub fn remote_head(workdir: &Path, remote: &RemoteRef) -> GitResult<Option<Sha>> {
    let refname = remote.refname();
    let stdout = run_git_stdout(workdir, &["ls-remote", &remote.url, &refname])?;
    let Some(line) = stdout.lines().find(|l| l.ends_with(&refname)) else {
        return Ok(None);
    };
    // Format: "SHA\trefs/heads/branch"
    let sha_str = line.split('\t').next().unwrap_or("");
    Sha::parse(sha_str)
        .map(Some)
        .map_err(|_| GitError::InvalidSha(sha_str.to_string()))
}

/// A repository on local disk driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    /// Opens an existing repository without checking it.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        GitRepository { root: root.into() }
    }

    /// Creates an empty non-bare repository at `root`.
    pub fn init(root: &Path) -> GitResult<Self> {
        std::fs::create_dir_all(root)?;
        run_git_sync(root, &["init", "--quiet"])?;
        Ok(Self::open(root))
    }

    /// Creates a fresh clone of `remote` at `root` with `remote.name` checked out.
    ///
    /// A branch missing on the remote becomes an unborn local branch, so the
    /// first push creates it.
    pub fn materialize(root: &Path, remote: &RemoteRef) -> GitResult<Self> {
        let repo = Self::init(root)?;
        match remote_head(root, remote)? {
            Some(head) => {
                let tracking = format!("refs/remotes/origin/{}", remote.name);
                let refspec = format!("+{}:{}", remote.refname(), tracking);
                run_git_sync(root, &["fetch", "--quiet", &remote.url, &refspec])?;
                run_git_sync(root, &["checkout", "--quiet", "-B", &remote.name, &tracking])?;
                debug!(url = %remote.url, branch = %remote.name, head = %head, "Materialized repository");
            }
            None => {
                run_git_sync(root, &["symbolic-ref", "HEAD", &remote.refname()])?;
                debug!(url = %remote.url, branch = %remote.name, "Remote branch missing, starting empty");
            }
        }
        Ok(repo)
    }

    /// Checks out `rev` with a detached HEAD.
    pub fn checkout_detached(&self, rev: &str) -> GitResult<()> {
        run_git_sync(&self.root, &["checkout", "--quiet", "--detach", rev])?;
        Ok(())
    }

    pub fn merge_base(&self, a: &Sha, b: &Sha) -> GitResult<Sha> {
        rev_parse_output(run_git_stdout(
            &self.root,
            &["merge-base", a.as_str(), b.as_str()],
        )?)
    }

    /// Creates a commit with the tree of `tree_of` and the single parent `parent`,
    /// then checks it out detached. Returns the new commit.
    pub fn squash(
        &self,
        tree_of: &Sha,
        parent: &Sha,
        message: &str,
        author: &CommitIdentity,
        committer: &CommitIdentity,
    ) -> GitResult<Sha> {
        let tree = format!("{}^{{tree}}", tree_of);
        let args = ["commit-tree", tree.as_str(), "-p", parent.as_str(), "-m", message];
        let output = git_commit_command(&self.root, committer)
            .args(args)
            .env("GIT_AUTHOR_NAME", &author.name)
            .env("GIT_AUTHOR_EMAIL", &author.email)
            .output()?;
        let output = check_output(output, &args)?;
        let commit = rev_parse_output(String::from_utf8_lossy(&output.stdout).trim().to_string())?;
        self.checkout_detached(commit.as_str())?;
        Ok(commit)
    }

    /// Files changed between two commits.
    pub fn changed_files(&self, from: &Sha, to: &Sha) -> GitResult<Vec<String>> {
        let stdout = run_git_stdout(
            &self.root,
            &["diff", "--name-only", from.as_str(), to.as_str()],
        )?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

fn rev_parse_output(s: String) -> GitResult<Sha> {
    Sha::parse(&s).map_err(|_| GitError::InvalidSha(s))
}

impl Repository for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> GitResult<Sha> {
        rev_parse(&self.root, "HEAD")
    }

    fn add_all(&self) -> GitResult<()> {
        run_git_sync(&self.root, &["add", "--all"])?;
        Ok(())
    }

    fn commit(
        &self,
        message: &str,
        author: &CommitIdentity,
        committer: &CommitIdentity,
    ) -> GitResult<Sha> {
        let author_arg = format!("--author={} <{}>", author.name, author.email);
        let mut args = vec![
            "commit",
            "--quiet",
            "--allow-empty",
            author_arg.as_str(),
            "-m",
            message,
        ];
        if committer.signing_key.is_some() {
            args.push("-S");
        }
        let output = git_commit_command(&self.root, committer)
            .args(&args)
            .output()?;
        check_output(output, &args)?;
        self.head()
    }

    fn fetch(&self, url: &str, refspec: &str) -> GitResult<Sha> {
        run_git_sync(&self.root, &["fetch", "--quiet", url, refspec])?;
        rev_parse(&self.root, "FETCH_HEAD")
    }

    fn push(&self, hash: &Sha, url: &str, refname: &str) -> GitResult<()> {
        let refspec = format!("{}:{}", hash, refname);
        let output = git_command(&self.root)
            .args(["push", "--quiet", url, &refspec])
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("non-fast-forward") || stderr.contains("rejected") {
            return Err(GitError::PushRejected { details: stderr });
        }
        Err(GitError::CommandFailed {
            command: format!("git push {} {}", url, refspec),
            stderr,
        })
    }

    fn rebase(&self, onto: &Sha, committer: &CommitIdentity) -> GitResult<Sha> {
        let output = git_commit_command(&self.root, committer)
            .args(["rebase", "--quiet", onto.as_str()])
            .output()?;
        if output.status.success() {
            return self.head();
        }
        let details = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        // Leave the working tree usable for the caller's error reporting.
        let _ = git_command(&self.root).args(["rebase", "--abort"]).output();
        if details.contains("CONFLICT") || details.contains("could not apply") {
            return Err(GitError::RebaseConflict { details });
        }
        Err(GitError::CommandFailed {
            command: format!("git rebase {}", onto),
            stderr: details,
        })
    }

    fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> GitResult<bool> {
        is_ancestor(&self.root, ancestor, descendant)
    }

    fn contains(&self, hash: &Sha) -> GitResult<bool> {
        let object = format!("{}^{{commit}}", hash);
        let output = git_command(&self.root)
            .args(["cat-file", "-e", &object])
            .output()?;
        Ok(output.status.success())
    }
}
