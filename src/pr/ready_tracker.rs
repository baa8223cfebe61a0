//! Records which head an author asked to integrate.
//!
//! The record is a marker inside a bot comment, so it survives restarts and is
//! re-read from the forge on every command.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Comment, HostUser, Sha};

static READY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!-- integration requested: '([0-9a-f]{40})' -->")
        .expect("constant regex pattern is valid")
});

/// The marker recording an integration request at `hash`.
pub fn ready_marker(hash: &Sha) -> String {
    format!("<!-- integration requested: '{}' -->", hash)
}

/// Head hash of the latest integration request recorded by `bot`.
pub fn latest_ready_for_sponsor(bot: &HostUser, comments: &[Comment]) -> Option<Sha> {
    comments
        .iter()
        .filter(|c| &c.author == bot)
        .filter_map(|c| READY_MARKER.captures_iter(&c.body).last())
        .last()
        .map(|captures| Sha::new(&captures[1]))
}
