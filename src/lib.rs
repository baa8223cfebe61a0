//! Forge Bridge - bots that mirror pull request activity to a mailing list and
//! integrate sponsored changes.
//!
//! The mailing-list bridge ([`mlbridge`]) archives each pull request as an email
//! thread in a git-backed archive and relays new messages to the configured
//! lists. The pull request bot ([`pr`]) answers `/integrate` and `/sponsor` and
//! dispatches commit comments. Both emit [`work`] items that the [`worker`]
//! runner schedules under a per-subject conflict rule.

pub mod census;
pub mod commands;
pub mod config;
pub mod email;
pub mod forge;
pub mod git;
pub mod mlbridge;
pub mod pr;
pub mod types;
pub mod work;
pub mod worker;

#[cfg(test)]
mod test_utils;
