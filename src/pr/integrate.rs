//! The `/integrate` command.
//!
//! Authors with commit rights are integrated directly. Everyone else gets their
//! current head recorded for a sponsor and the `sponsor` label.

use tracing::{error, info};

use crate::census::Census;
use crate::types::{PrState, labels};
use crate::work::WorkError;

use super::bot::PullRequestContext;
use super::command::CommandInvocation;
use super::integration::{Integration, report};
use super::ready_tracker::ready_marker;
use super::reply::Reply;

pub fn handle(
    ctx: &PullRequestContext,
    invocation: &CommandInvocation<'_>,
    reply: &mut Reply,
) -> Result<(), WorkError> {
    let pr = invocation.pr;
    let census: &dyn Census = ctx.census.as_ref();

    if invocation.comment.author != pr.author {
        reply.line(format!(
            "Only the author (@{}) is allowed to issue the `integrate` command.",
            pr.author.username
        ));
        return Ok(());
    }
    if pr.has_label(labels::REJECTED) {
        reply.line("The change is currently blocked from integration by a rejection.");
        return Ok(());
    }

    if !census.may_commit(&pr.author) {
        reply.line(ready_marker(&pr.head_sha));
        reply.line(format!(
            "Your change (at version {}) is now ready to be sponsored by a Committer.",
            pr.head_sha
        ));
        if !pr.has_label(labels::SPONSOR) {
            ctx.forge.add_label(pr, labels::SPONSOR)?;
        }
        info!(repo = %pr.repo, pr = %pr.number, head = %pr.head_sha, "Waiting for a sponsor");
        return Ok(());
    }

    let identity = census.commit_identity(&pr.author);
    let integration = Integration {
        forge: ctx.forge.as_ref(),
        validator: ctx.validator.as_ref(),
        pr,
        author: identity.clone(),
        committer: identity,
    };
    let result = integration
        .run(&invocation.scratch.join("pr.integrate"))
        .and_then(|outcome| {
            if report(outcome, reply).is_some() {
                ctx.forge.set_state(pr, PrState::Closed)?;
                ctx.forge.add_label(pr, labels::INTEGRATED)?;
                if pr.has_label(labels::READY) {
                    ctx.forge.remove_label(pr, labels::READY)?;
                }
            }
            Ok(())
        });
    if let Err(e) = result {
        error!(repo = %pr.repo, pr = %pr.number, error = %e, "Integration failed");
        reply.line("An error occurred during integration");
        return Err(e);
    }
    Ok(())
}
