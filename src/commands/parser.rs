//! Parser for slash commands in comment text.
//!
//! Pure functions over comment bodies; no forge access.

use std::sync::LazyLock;

use regex::Regex;

use super::types::Command;

/// A command line: optional leading whitespace, `/`, a word, then arguments.
pub static COMMAND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*/([A-Za-z]+)(.*)$").expect("constant regex pattern is valid")
});

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub command: Command,

    /// Text after the command word, trimmed.
    pub args: String,
}

/// Parses a single line. `None` if it is not a command line.
pub fn parse_command_line(line: &str) -> Option<CommandLine> {
    let captures = COMMAND_LINE.captures(line)?;
    Some(CommandLine {
        command: Command::from_name(&captures[1]),
        args: captures[2].trim().to_string(),
    })
}

/// All command lines in a comment body, in order.
pub fn parse_commands(body: &str) -> Vec<CommandLine> {
    body.lines().filter_map(parse_command_line).collect()
}

/// True if the trimmed body has at least one non-blank line and every non-blank
/// line is a command line.
pub fn is_command_only(body: &str) -> bool {
    let mut lines = body
        .trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .peekable();
    lines.peek().is_some() && lines.all(|line| COMMAND_LINE.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod parse {
        use super::*;

        #[test]
        fn command_with_arguments() {
            let line = parse_command_line("  /sponsor   now please ").unwrap();
            assert_eq!(line.command, Command::Sponsor);
            assert_eq!(line.args, "now please");
        }

        #[test]
        fn not_at_line_start() {
            assert_eq!(parse_command_line("please /sponsor"), None);
            assert_eq!(parse_command_line("/"), None);
            assert_eq!(parse_command_line("/123"), None);
        }

        #[test]
        fn multiple_lines() {
            let commands = parse_commands("Thanks!\n/integrate\nsome text\n/Sponsor");
            let names: Vec<_> = commands.iter().map(|c| c.command.clone()).collect();
            assert_eq!(names, vec![Command::Integrate, Command::Sponsor]);
        }

        #[test]
        fn unknown_commands_are_kept() {
            let line = parse_command_line("/help me").unwrap();
            assert_eq!(line.command, Command::Unknown("help".into()));
        }
    }

    mod command_only {
        use super::*;

        #[test]
        fn blank_body_is_not_command_only() {
            assert!(!is_command_only(""));
            assert!(!is_command_only("  \n\t\n"));
        }

        #[test]
        fn blank_lines_between_commands_are_ignored() {
            assert!(is_command_only("/integrate\n\n   /sponsor\n"));
        }

        #[test]
        fn prose_disqualifies() {
            assert!(!is_command_only("/integrate\nThis looks fine"));
        }
    }

    fn arb_command_line() -> impl Strategy<Value = String> {
        ("[ \t]{0,3}", "[A-Za-z]{1,10}", "[a-z0-9 ]{0,15}")
            .prop_map(|(ws, name, args)| format!("{ws}/{name}{args}"))
    }

    fn arb_prose_line() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z .,]{0,30}"
    }

    proptest! {
        #[test]
        fn command_lines_only_are_always_ignored(
            lines in prop::collection::vec(arb_command_line(), 1..6)
        ) {
            prop_assert!(is_command_only(&lines.join("\n")));
        }

        #[test]
        fn one_prose_line_is_never_command_only(
            commands in prop::collection::vec(arb_command_line(), 0..4),
            prose in arb_prose_line(),
            position in 0usize..5,
        ) {
            let mut lines = commands;
            let at = position.min(lines.len());
            lines.insert(at, prose);
            prop_assert!(!is_command_only(&lines.join("\n")));
        }
    }
}
