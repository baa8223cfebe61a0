//! Whether a pull request may start an archive thread.
//!
//! Only consulted while nothing has been archived for the pull request yet; once a
//! thread exists it is always kept in sync.

use tracing::debug;

use crate::config::BridgeConfig;
use crate::types::{Comment, PullRequest, labels};

/// Result of the readiness gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Open pull request without one of the configured ready labels.
    MissingLabel(String),
    /// Closed pull request that was not integrated. Never becomes ready.
    NotIntegrated,
    /// No comment from `user` matches the configured pattern.
    MissingComment { user: String, pattern: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Evaluates the gate against the current snapshot.
///
/// State and labels are checked first, then the ready-comment rules. The first
/// failing rule is reported.
pub fn evaluate(config: &BridgeConfig, pr: &PullRequest, comments: &[Comment]) -> Readiness {
    let readiness = check(config, pr, comments);
    if !readiness.is_ready() {
        debug!(repo = %pr.repo, pr = %pr.number, ?readiness, "Pull request not ready for archiving");
    }
    readiness
}

fn check(config: &BridgeConfig, pr: &PullRequest, comments: &[Comment]) -> Readiness {
    if pr.state.is_open() {
        if let Some(missing) = config.ready_labels.iter().find(|l| !pr.has_label(l)) {
            return Readiness::MissingLabel(missing.clone());
        }
    } else if !pr.has_label(labels::INTEGRATED) {
        return Readiness::NotIntegrated;
    }

    for (user, pattern) in &config.ready_comments {
        let found = comments
            .iter()
            .any(|c| &c.author.username == user && pattern.is_match(&c.body));
        if !found {
            return Readiness::MissingComment {
                user: user.clone(),
                pattern: pattern.as_str().to_string(),
            };
        }
    }

    Readiness::Ready
}
