//! Command types for slash commands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A recognized slash command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// `/integrate`: the author declares the change ready.
    Integrate,

    /// `/sponsor`: a committer integrates on behalf of the author.
    Sponsor,

    /// Any other `/word`. Kept so the bot can answer it.
    Unknown(String),
}

impl Command {
    /// Maps a command word (case-insensitive) to a command.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "integrate" => Command::Integrate,
            "sponsor" => Command::Sponsor,
            other => Command::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Integrate => f.write_str("integrate"),
            Command::Sponsor => f.write_str("sponsor"),
            Command::Unknown(name) => f.write_str(name),
        }
    }
}
