//! Answers slash commands on a pull request.
//!
//! Which commands were already answered is re-derived from the reply markers in
//! the bot's own comments, so nothing needs to be stored.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::commands::{Command, parse_commands};
use crate::types::{Comment, CommentId, HostUser, PullRequest};
use crate::work::{WorkError, WorkIdentity, WorkItem, WorkKind, WorkOutcome};

use super::bot::PullRequestContext;
use super::reply::{Reply, replied_to, reply_marker};
use super::{integrate, sponsor};

/// One command being handled.
pub struct CommandInvocation<'a> {
    pub pr: &'a PullRequest,
    /// The comment the command line appeared in.
    pub comment: &'a Comment,
    pub args: &'a str,
    pub all_comments: &'a [Comment],
    pub bot_user: &'a HostUser,
    /// Private to this invocation.
    pub scratch: &'a Path,
}

fn dispatch(
    ctx: &PullRequestContext,
    command: &Command,
    invocation: &CommandInvocation<'_>,
    reply: &mut Reply,
) -> Result<(), WorkError> {
    match command {
        Command::Integrate => integrate::handle(ctx, invocation, reply),
        Command::Sponsor => sponsor::handle(ctx, invocation, reply),
        Command::Unknown(name) => {
            reply.line(format!("Unknown command `{}`.", name));
            Ok(())
        }
    }
}

/// Comment ids the bot has already replied to.
fn answered(bot_user: &HostUser, comments: &[Comment]) -> HashSet<CommentId> {
    comments
        .iter()
        .filter(|c| &c.author == bot_user)
        .filter_map(|c| replied_to(&c.body))
        .collect()
}

/// Handles every unanswered command on one pull request.
pub struct PullRequestCommandsWorkItem {
    pr: PullRequest,
    context: Arc<PullRequestContext>,
}

impl PullRequestCommandsWorkItem {
    pub fn new(pr: PullRequest, context: Arc<PullRequestContext>) -> Self {
        PullRequestCommandsWorkItem { pr, context }
    }
}

impl fmt::Display for PullRequestCommandsWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PullRequestCommandsWorkItem@{}{}", self.pr.repo, self.pr.number)
    }
}

impl WorkItem for PullRequestCommandsWorkItem {
    fn identity(&self) -> WorkIdentity {
        WorkIdentity::pull_request(
            WorkKind::PullRequestCommands,
            self.pr.repo.clone(),
            self.pr.number,
        )
    }

    fn run(&self, scratch: &Path) -> Result<WorkOutcome, WorkError> {
        let ctx = &self.context;
        let pr = &self.pr;
        let comments = ctx.forge.comments(pr)?;
        let bot_user = ctx.forge.current_user()?;
        let answered = answered(&bot_user, &comments);

        for comment in &comments {
            if comment.author == bot_user || answered.contains(&comment.id) {
                continue;
            }
            let lines = parse_commands(&comment.body);
            if lines.is_empty() {
                continue;
            }
            info!(repo = %pr.repo, pr = %pr.number, comment = %comment.id, "Handling commands");

            let mut reply = Reply::new();
            reply.line(reply_marker(comment.id));
            let comment_scratch = scratch.join(comment.id.to_string());
            let mut result = Ok(());
            for line in &lines {
                let invocation = CommandInvocation {
                    pr,
                    comment,
                    args: &line.args,
                    all_comments: &comments,
                    bot_user: &bot_user,
                    scratch: &comment_scratch,
                };
                result = dispatch(ctx, &line.command, &invocation, &mut reply);
                if result.is_err() {
                    break;
                }
            }
            ctx.forge.add_comment(pr, reply.text())?;
            result?;
        }
        debug!(repo = %pr.repo, pr = %pr.number, "Commands up to date");
        Ok(WorkOutcome::done())
    }

    fn handle_failure(&self, error: &WorkError) {
        if !error.is_retryable() {
            warn!(repo = %self.pr.repo, pr = %self.pr.number, error = %error, "Waiting for new activity before retrying");
            return;
        }
        self.context.updates.invalidate(&self.pr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::comment;

    #[test]
    fn answered_only_counts_bot_replies() {
        let bot = HostUser::new(1000, "pr-bot", "PR Bot");
        let duke = HostUser::new(2, "duke", "Duke");
        let comments = vec![
            comment(1, duke.clone(), "/integrate"),
            comment(2, bot.clone(), &format!("{}\nok", reply_marker(CommentId(1)))),
            comment(3, duke, &reply_marker(CommentId(5))),
        ];
        let ids = answered(&bot, &comments);
        assert_eq!(ids, [CommentId(1)].into());
    }
}
