//! Text of a bot reply to a command comment.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::CommentId;

static REPLY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!-- pr-bot command reply \((\d+)\) -->").expect("constant regex pattern is valid")
});

/// Marker tying a reply to the command comment it answers.
pub fn reply_marker(id: CommentId) -> String {
    format!("<!-- pr-bot command reply ({}) -->", id)
}

/// The command comment a reply body answers, if it carries a marker.
pub fn replied_to(body: &str) -> Option<CommentId> {
    let captures = REPLY_MARKER.captures(body)?;
    captures[1].parse().ok().map(CommentId)
}

/// Accumulates reply text.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    text: String,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text without a line break.
    pub fn push(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
