//! The mailing-list bridge.
//!
//! Pull request discussion is mirrored into a shared git-backed archive with one
//! mbox file per pull request, then relayed to the configured mailing lists.
//! Nothing is remembered between polls except which pull requests changed: the
//! sent mails are recovered from the archive on every run.
//!
//! # Module Structure
//!
//! - [`readiness`]: Gate for the first archived mail
//! - [`classify`]: Mirror vs ignore decisions
//! - [`archive`]: Builds the new mails for a pull request
//! - [`webrev`]: Webrev links and the summary comment
//! - [`update_cache`]: Which pull requests need a run
//! - [`work_item`]: The archive run
//! - [`bot`]: The periodic bot

pub mod archive;
pub mod bot;
pub mod classify;
pub mod readiness;
pub mod update_cache;
pub mod webrev;
pub mod work_item;


pub use bot::{BridgeContext, MailingListBridgeBot};
pub use readiness::Readiness;
pub use webrev::{LinkWebrevGenerator, WebrevDescription, WebrevGenerator};
pub use work_item::ArchiveWorkItem;
