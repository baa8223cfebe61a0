//! The archive run for a single pull request.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::email::{Email, MailingList, MboxList};
use crate::git::push::commit_and_push;
use crate::git::{GitRepository, Repository};
use crate::types::{PullRequest, RepoId};
use crate::work::{WorkError, WorkIdentity, WorkItem, WorkKind, WorkOutcome};

use super::archive::{ArchiveContext, generate_new_emails, subject_prefix};
use super::bot::BridgeContext;
use super::classify::Classifier;
use super::readiness;
use super::webrev::sync_webrev_comment;

/// How far back the archive is read when recovering sent mails.
const ARCHIVE_WINDOW_DAYS: i64 = 365;

/// Mirrors new activity on one pull request into the archive and the list.
pub struct ArchiveWorkItem {
    pr: PullRequest,
    context: Arc<BridgeContext>,
}

impl ArchiveWorkItem {
    pub fn new(pr: PullRequest, context: Arc<BridgeContext>) -> Self {
        ArchiveWorkItem { pr, context }
    }
}

impl fmt::Display for ArchiveWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchiveWorkItem@{}{}", self.pr.repo, self.pr.number)
    }
}

/// Directory holding the mbox files of `repo` inside an archive checkout.
pub fn repository_dir(archive: &Path, repo: &RepoId) -> PathBuf {
    archive.join(&repo.owner).join(&repo.repo)
}

/// The messages already archived for a pull request.
///
/// At most one thread may exist; more is a corrupted archive.
pub fn load_sent(list: &dyn MailingList, pr: &PullRequest) -> Result<Vec<Email>, WorkError> {
    let mut conversations = list.conversations(Duration::days(ARCHIVE_WINDOW_DAYS))?;
    match conversations.len() {
        0 => Ok(Vec::new()),
        1 => Ok(conversations.remove(0).into_messages()),
        threads => Err(WorkError::ArchiveCorrupted {
            repo: pr.repo.clone(),
            pr: pr.number,
            threads,
        }),
    }
}

impl WorkItem for ArchiveWorkItem {
    fn identity(&self) -> WorkIdentity {
        WorkIdentity::pull_request(WorkKind::Archive, self.pr.repo.clone(), self.pr.number)
    }

    fn run(&self, scratch: &Path) -> Result<WorkOutcome, WorkError> {
        let ctx = &self.context;
        let config = &ctx.config;
        let pr = &self.pr;

        let path = scratch.join("mlbridge");
        let archive = GitRepository::materialize(&path, &config.archive)?;
        let mbox = MboxList::for_pull_request(&repository_dir(&path, &pr.repo), pr.number);
        let sent = load_sent(&mbox, pr)?;

        let comments = ctx.forge.comments(pr)?;
        if sent.is_empty() && !readiness::evaluate(config, pr, &comments).is_ready() {
            return Ok(WorkOutcome::done());
        }

        let recipients = config.recipients(&pr.labels);
        if recipients.is_empty() {
            debug!(repo = %pr.repo, pr = %pr.number, "No mailing list matches the labels");
            return Ok(WorkOutcome::done());
        }

        let bot_user = ctx.forge.current_user()?;
        let classifier = Classifier {
            bot_user: &bot_user,
            ignored_users: &config.ignored_users,
            ignored_comments: &config.ignored_comments,
        };
        let mirrored = classifier.classify(
            comments.clone(),
            ctx.forge.reviews(pr)?,
            ctx.forge.review_comments(pr)?,
        );

        let archive_ctx = ArchiveContext {
            pr,
            bot: &config.email,
            census: ctx.census.as_ref(),
            ignored_users: &config.ignored_users,
            recipients: &recipients,
            subject_prefix: subject_prefix(pr, config.repo_in_subject, &config.branch_in_subject),
            cooldown: config.cooldown,
            now: Utc::now(),
        };
        let new = generate_new_emails(
            &archive_ctx,
            &mirrored,
            &sent,
            ctx.webrevs.as_ref(),
            |index, webrevs| {
                sync_webrev_comment(ctx.forge.as_ref(), pr, &bot_user, &comments, index, webrevs)?;
                Ok(())
            },
        )?;

        if let Some(at) = new.retry_at {
            debug!(repo = %pr.repo, pr = %pr.number, retry_at = %at, "Deferring young activity");
            ctx.updates.retry_at(pr, at);
        }
        if new.emails.is_empty() {
            return Ok(outcome(new.retry_at));
        }

        for email in &new.emails {
            mbox.post(email)?;
        }
        let identity = config.commit_identity();
        let message = format!("Adding comments for PR {}/{}", pr.repo, pr.number.0);
        let pushed = commit_and_push(&archive, &config.archive, &identity, |repo| {
            repo.add_all()?;
            repo.commit(&message, &identity, &identity)
        })?;
        info!(
            repo = %pr.repo,
            pr = %pr.number,
            head = %pushed,
            mails = new.emails.len(),
            "Archived new mails"
        );

        for email in &new.emails {
            ctx.list.post(&email.relay_copy(&config.headers, &recipients))?;
        }
        Ok(outcome(new.retry_at))
    }

    fn handle_failure(&self, error: &WorkError) {
        if error.is_integrity_fault() {
            warn!(repo = %self.pr.repo, pr = %self.pr.number, error = %error, "Archive needs operator attention");
            return;
        }
        if !error.is_retryable() {
            warn!(repo = %self.pr.repo, pr = %self.pr.number, error = %error, "Waiting for new activity before retrying");
            return;
        }
        self.context.updates.invalidate(&self.pr);
    }
}

fn outcome(retry_at: Option<chrono::DateTime<Utc>>) -> WorkOutcome {
    match retry_at {
        Some(at) => WorkOutcome::retry_at(at),
        None => WorkOutcome::done(),
    }
}
