//! Builds the mails that mirror a pull request's review thread.
//!
//! Every mail has a message id derived from the pull request and the forge item
//! it mirrors, so anything already archived is recognized and never built again.
//! Running the builder twice on unchanged input yields nothing the second time.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::census::Census;
use crate::email::{Email, EmailAddress, EmailId};
use crate::types::{
    Comment, HostUser, PullRequest, Review, ReviewComment, Sha, Verdict, labels,
};
use crate::work::WorkError;

use super::classify::Mirrored;
use super::webrev::{WebrevDescription, WebrevGenerator, describe};

/// Tracking header holding the head a revision mail was built for.
pub const HEAD_HASH_HEADER: &str = "PR-Head-Hash";

/// Everything the builder needs besides the mirrored activity.
pub struct ArchiveContext<'a> {
    pub pr: &'a PullRequest,
    /// Sender of every mail; also the author for ignored users.
    pub bot: &'a EmailAddress,
    pub census: &'a dyn Census,
    pub ignored_users: &'a BTreeSet<String>,
    pub recipients: &'a [EmailAddress],
    pub subject_prefix: String,
    /// Minimum age of an item before it is mirrored.
    pub cooldown: Duration,
    pub now: DateTime<Utc>,
}

/// Mails to append, plus when deferred items become due.
#[derive(Debug, Default)]
pub struct NewMails {
    pub emails: Vec<Email>,
    pub retry_at: Option<DateTime<Utc>>,
}

/// `[repo:branch] `, `[repo] `, `[branch] ` or nothing.
///
/// The branch is included when `branch_in_subject` matches the whole target
/// branch name.
pub fn subject_prefix(pr: &PullRequest, repo_in_subject: bool, branch_in_subject: &Regex) -> String {
    let use_branch = branch_in_subject
        .find(&pr.target_ref)
        .is_some_and(|m| m.start() == 0 && m.end() == pr.target_ref.len());
    match (repo_in_subject, use_branch) {
        (true, true) => format!("[{}:{}] ", pr.repo.repo, pr.target_ref),
        (true, false) => format!("[{}] ", pr.repo.repo),
        (false, true) => format!("[{}] ", pr.target_ref),
        (false, false) => String::new(),
    }
}

impl ArchiveContext<'_> {
    /// Address a forge user's mail is sent from.
    pub fn author_address(&self, user: &HostUser) -> EmailAddress {
        if self.ignored_users.contains(&user.username) {
            return self.bot.clone();
        }
        match self.census.contributor(user) {
            Some(contributor) => EmailAddress::new(
                contributor.full_name.unwrap_or_else(|| user.full_name.clone()),
                format!("{}@{}", contributor.username, self.census.domain()),
            ),
            None => EmailAddress::new(
                user.full_name.clone(),
                format!(
                    "{}+{}+{}@{}",
                    self.census.namespace(),
                    user.id,
                    user.username,
                    self.census.domain()
                ),
            ),
        }
    }

    pub fn author_username(&self, user: &HostUser) -> String {
        match self.census.contributor(user) {
            Some(contributor) => contributor.username,
            None => format!("{}@{}", user.username, self.census.namespace()),
        }
    }

    pub fn author_role(&self, user: &HostUser) -> String {
        match self.census.contributor(user) {
            Some(contributor) => self.census.role(&contributor.username).to_string(),
            None => format!("no known {} username", self.census.namespace()),
        }
    }

    fn id(&self, part: impl std::fmt::Display) -> EmailId {
        EmailId::new(
            format!("pr.{}.{}.{}", self.pr.repo.slug(), self.pr.number.0, part),
            self.bot.domain(),
        )
    }

    fn subject(&self) -> String {
        format!("{}RFR: {}", self.subject_prefix, self.pr.title)
    }

    fn footer(&self) -> String {
        format!("\n\n-------------\n\nPR: {}", self.pr.web_url)
    }

    fn revision_footer(&self, webrevs: &[WebrevDescription]) -> String {
        format!(
            "\n\n-------------\n\nChanges: {}\n Webrevs: {}\n      PR: {}",
            self.pr.files_url(&self.pr.head_sha),
            describe(webrevs),
            self.pr.web_url
        )
    }

    fn mail(
        &self,
        id: EmailId,
        author: EmailAddress,
        subject: String,
        body: String,
        date: DateTime<Utc>,
        in_reply_to: Option<EmailId>,
    ) -> Email {
        Email {
            id,
            date,
            author,
            sender: self.bot.clone(),
            recipients: self.recipients.to_vec(),
            subject,
            body,
            in_reply_to,
            headers: BTreeMap::new(),
        }
    }
}

/// Builds the mails not yet present in `sent`.
///
/// `on_webrev` is called with the revision index and links whenever a new
/// revision mail is built, before the mail is returned.
pub fn generate_new_emails(
    ctx: &ArchiveContext<'_>,
    mirrored: &Mirrored,
    sent: &[Email],
    webrevs: &dyn WebrevGenerator,
    mut on_webrev: impl FnMut(usize, &[WebrevDescription]) -> Result<(), WorkError>,
) -> Result<NewMails, WorkError> {
    let sent_ids: HashSet<&EmailId> = sent.iter().map(|m| &m.id).collect();
    let revisions: Vec<Sha> = sent
        .iter()
        .filter_map(|m| m.header(HEAD_HASH_HEADER))
        .map(Sha::new)
        .collect();

    let mut new = NewMails::default();
    let root_id = ctx.id("rfr");
    let head = &ctx.pr.head_sha;

    if !sent_ids.contains(&root_id) {
        let links = webrevs.generate(ctx.pr, 0, None, head)?;
        on_webrev(0, &links)?;
        let body = format!("{}{}", ctx.pr.body.trim_end(), ctx.revision_footer(&links));
        let mut root = ctx.mail(
            root_id.clone(),
            ctx.author_address(&ctx.pr.author),
            ctx.subject(),
            body,
            ctx.now,
            None,
        );
        root.headers.insert(HEAD_HASH_HEADER.into(), head.to_string());
        new.emails.push(root);
    } else if !revisions.contains(head) {
        let index = revisions.len();
        let links = webrevs.generate(ctx.pr, index, revisions.last(), head)?;
        on_webrev(index, &links)?;
        let body = format!(
            "{} has updated the pull request with a new revision.{}",
            ctx.author_username(&ctx.pr.author),
            ctx.revision_footer(&links)
        );
        let mut revision = ctx.mail(
            ctx.id(format_args!("rev.{}", head)),
            ctx.author_address(&ctx.pr.author),
            format!("Re: {}", ctx.subject()),
            body,
            ctx.now,
            Some(root_id.clone()),
        );
        revision.headers.insert(HEAD_HASH_HEADER.into(), head.to_string());
        new.emails.push(revision);
    }

    let mut builder = Replies {
        ctx,
        sent: &sent_ids,
        root: &root_id,
        new: &mut new,
    };
    for comment in &mirrored.comments {
        builder.comment(comment);
    }
    for review in &mirrored.reviews {
        builder.review(review);
    }
    for comment in &mirrored.review_comments {
        builder.review_comment(comment);
    }

    let closed_id = ctx.id("closed");
    if !ctx.pr.state.is_open() && new.retry_at.is_none() && !sent_ids.contains(&closed_id) {
        let (verb, text) = if ctx.pr.has_label(labels::INTEGRATED) {
            ("Integrated", "This pull request has now been integrated.")
        } else {
            ("Withdrawn", "This pull request has been closed without being integrated.")
        };
        let notice = ctx.mail(
            closed_id,
            ctx.author_address(&ctx.pr.author),
            format!("{}{}: {}", ctx.subject_prefix, verb, ctx.pr.title),
            format!("{}\n\nChangeset: {}{}", text, ctx.pr.head_sha, ctx.footer()),
            ctx.now,
            Some(root_id),
        );
        new.emails.push(notice);
    }

    Ok(new)
}

/// Reply mails for mirrored items, honoring the cooldown.
struct Replies<'a, 'b> {
    ctx: &'a ArchiveContext<'b>,
    sent: &'a HashSet<&'a EmailId>,
    root: &'a EmailId,
    new: &'a mut NewMails,
}

impl Replies<'_, '_> {
    /// True if an item created at `created_at` may be mirrored now.
    fn cooled_down(&mut self, created_at: DateTime<Utc>) -> bool {
        let due = created_at + self.ctx.cooldown;
        if due <= self.ctx.now {
            return true;
        }
        self.new.retry_at = Some(match self.new.retry_at {
            Some(existing) => existing.min(due),
            None => due,
        });
        false
    }

    fn reply(&mut self, id: EmailId, author: &HostUser, body: String, date: DateTime<Utc>) {
        if self.sent.contains(&id) || !self.cooled_down(date) {
            return;
        }
        let mail = self.ctx.mail(
            id,
            self.ctx.author_address(author),
            format!("Re: {}", self.ctx.subject()),
            format!("{}{}", body, self.ctx.footer()),
            date,
            Some(self.root.clone()),
        );
        self.new.emails.push(mail);
    }

    fn comment(&mut self, comment: &Comment) {
        let id = self.ctx.id(format_args!("c{}", comment.id));
        self.reply(id, &comment.author, comment.body.trim_end().to_string(), comment.created_at);
    }

    fn review(&mut self, review: &Review) {
        let who = format!(
            "{} ({})",
            self.ctx.author_username(&review.reviewer),
            self.ctx.author_role(&review.reviewer)
        );
        let verdict = match review.verdict {
            Verdict::Approved => Some(format!("Marked as reviewed by {}.", who)),
            Verdict::Disapproved => Some(format!("Changes requested by {}.", who)),
            Verdict::None => None,
        };
        let text = review.body.as_deref().map(str::trim_end).filter(|b| !b.is_empty());
        let body = match (text, verdict) {
            (Some(text), Some(verdict)) => format!("{}\n\n{}", text, verdict),
            (Some(text), None) => text.to_string(),
            (None, Some(verdict)) => verdict,
            (None, None) => return,
        };
        let id = self.ctx.id(format_args!("r{}", review.id));
        self.reply(id, &review.reviewer, body, review.created_at);
    }

    fn review_comment(&mut self, comment: &ReviewComment) {
        let body = format!("{} line {}:\n\n{}", comment.path, comment.line, comment.body.trim_end());
        let id = self.ctx.id(format_args!("rc{}", comment.id));
        self.reply(id, &comment.author, body, comment.created_at);
    }
}
