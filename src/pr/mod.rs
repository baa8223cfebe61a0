//! The pull request bot: slash commands, sponsored integration and commit
//! comment dispatch.
//!
//! # Module Structure
//!
//! - [`command`]: Finds unanswered commands and posts replies
//! - [`integrate`] / [`sponsor`]: The command handlers
//! - [`integration`]: Squash, rebase, check and push
//! - [`ready_tracker`]: The recorded integration request
//! - [`commit_comments`]: Commit comment deduplication
//! - [`bot`]: The periodic bot

pub mod bot;
pub mod command;
pub mod commit_comments;
pub mod integrate;
pub mod integration;
pub mod ready_tracker;
pub mod reply;
pub mod sponsor;


pub use bot::{PullRequestBot, PullRequestContext};
pub use command::PullRequestCommandsWorkItem;
pub use commit_comments::{
    CommitCommandHandler, CommitCommandWorkItem, CommitCommentsWorkItem, ProcessedSet,
};
pub use integration::{ChangeValidator, IntegrationOutcome};
