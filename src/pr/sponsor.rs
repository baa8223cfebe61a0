//! The `/sponsor` command: a Committer integrates a contributor's change.

use tracing::error;

use crate::census::Census;
use crate::types::{PrState, labels};
use crate::work::WorkError;

use super::bot::PullRequestContext;
use super::command::CommandInvocation;
use super::integration::{Integration, report};
use super::ready_tracker::latest_ready_for_sponsor;
use super::reply::Reply;

pub fn handle(
    ctx: &PullRequestContext,
    invocation: &CommandInvocation<'_>,
    reply: &mut Reply,
) -> Result<(), WorkError> {
    let pr = invocation.pr;
    let census: &dyn Census = ctx.census.as_ref();
    let author = &pr.author.username;

    if census.may_commit(&pr.author) {
        reply.line("This change does not need sponsoring - the author is allowed to integrate it.");
        return Ok(());
    }
    if !census.may_commit(&invocation.comment.author) {
        reply.line("Only Committers are allowed to sponsor changes.");
        return Ok(());
    }

    let Some(ready_hash) = latest_ready_for_sponsor(invocation.bot_user, invocation.all_comments)
    else {
        reply.line(format!(
            "The change author (@{}) must issue an `integrate` command before the integration can be sponsored.",
            author
        ));
        return Ok(());
    };
    if pr.head_sha != ready_hash {
        reply.line(format!(
            "The PR has been updated since the change author (@{}) issued the `integrate` command - \
             the author must perform this command again.",
            author
        ));
        return Ok(());
    }

    if pr.has_label(labels::REJECTED) {
        reply.line("The change is currently blocked from integration by a rejection.");
        return Ok(());
    }

    reply.push(format!("@{} ", author));

    if let Err(e) = integrate(ctx, invocation, reply) {
        error!(repo = %pr.repo, pr = %pr.number, error = %e, "Sponsored integration failed");
        reply.line("An error occurred during sponsored integration");
        return Err(e);
    }
    Ok(())
}

fn integrate(
    ctx: &PullRequestContext,
    invocation: &CommandInvocation<'_>,
    reply: &mut Reply,
) -> Result<(), WorkError> {
    let pr = invocation.pr;
    let census: &dyn Census = ctx.census.as_ref();
    let integration = Integration {
        forge: ctx.forge.as_ref(),
        validator: ctx.validator.as_ref(),
        pr,
        author: census.commit_identity(&pr.author),
        committer: census.commit_identity(&invocation.comment.author),
    };
    let outcome = integration.run(&invocation.scratch.join("pr.sponsor"))?;
    if report(outcome, reply).is_some() {
        ctx.forge.set_state(pr, PrState::Closed)?;
        ctx.forge.add_label(pr, labels::INTEGRATED)?;
        ctx.forge.remove_label(pr, labels::SPONSOR)?;
        ctx.forge.remove_label(pr, labels::READY)?;
    }
    Ok(())
}
