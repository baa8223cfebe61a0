//! Slash commands in pull request comments.
//!
//! A command is a comment line of the form `/name args`. Lines anywhere in a
//! comment may carry commands; comments made only of command lines are bot
//! traffic and are not mirrored to the mailing list.
//!
//! # Supported Commands
//!
//! - `/integrate` - The author asks for the change to be integrated
//! - `/sponsor` - A committer integrates a change on behalf of its author
//!
//! # Example
//!
//! ```
//! use forge_bridge::commands::{parse_commands, is_command_only, Command};
//!
//! let comment = "Looks good.\n/sponsor";
//! assert_eq!(parse_commands(comment)[0].command, Command::Sponsor);
//! assert!(!is_command_only(comment));
//! assert!(is_command_only("  /integrate\n"));
//! ```

mod parser;
mod types;

pub use parser::{COMMAND_LINE, CommandLine, is_command_only, parse_command_line, parse_commands};
pub use types::Command;
