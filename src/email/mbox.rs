//! File-backed mailing list in mboxrd format.
//!
//! Each pull request's thread lives in `<base>/<pr-number>.mbox`. Messages are
//! appended, never rewritten. Body lines that would look like a message separator
//! (`From `, `>From `, ...) gain one leading `>` on write and lose it on read.
//!
//! Trailing newlines of message bodies are not preserved.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::types::PrNumber;

use super::{
    Conversation, Email, EmailAddress, EmailId, MailError, MailResult, MailingList,
    thread_messages,
};

/// A mailing list stored as a single mbox file.
#[derive(Debug, Clone)]
pub struct MboxList {
    path: PathBuf,
}

impl MboxList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MboxList { path: path.into() }
    }

    /// The list holding a pull request's thread under `base`.
    pub fn for_pull_request(base: &Path, pr: PrNumber) -> Self {
        Self::new(base.join(format!("{}.mbox", pr.0)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All messages in file order.
    pub fn messages(&self) -> MailResult<Vec<Email>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        parse_mbox(&contents, &self.path.display().to_string())
    }
}

impl MailingList for MboxList {
    fn post(&self, email: &Email) -> MailResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(render_message(email).as_bytes())?;
        debug!(path = %self.path.display(), id = %email.id, "Appended message to mbox");
        Ok(())
    }

    fn conversations(&self, max_age: Duration) -> MailResult<Vec<Conversation>> {
        let cutoff = Utc::now() - max_age;
        Ok(thread_messages(self.messages()?)
            .into_iter()
            .filter(|c| c.first().date >= cutoff)
            .collect())
    }
}

/// Separator line date format (asctime).
const SEPARATOR_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Renders one message including its separator line and trailing blank line.
pub fn render_message(email: &Email) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "From {} {}",
        email.sender.address,
        email.date.format(SEPARATOR_DATE_FORMAT)
    );
    let mut header = |name: &str, value: &str| {
        let _ = writeln!(out, "{}: {}", name, single_line(value));
    };
    header("Message-Id", &email.id.to_string());
    header("Date", &email.date.to_rfc2822());
    header("From", &email.author.to_string());
    header("Sender", &email.sender.to_string());
    if !email.recipients.is_empty() {
        let to: Vec<String> = email.recipients.iter().map(quoted_address).collect();
        header("To", &to.join(", "));
    }
    header("Subject", &email.subject);
    if let Some(parent) = &email.in_reply_to {
        header("In-Reply-To", &parent.to_string());
    }
    for (name, value) in &email.headers {
        header(name, value);
    }
    out.push('\n');
    for line in email.body.lines() {
        if is_separator_like(line) {
            out.push('>');
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Parses every message in an mbox file.
pub fn parse_mbox(contents: &str, source_name: &str) -> MailResult<Vec<Email>> {
    let lines: Vec<&str> = contents.lines().collect();
    let mut starts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("From ") && (i == 0 || lines[i - 1].is_empty()) {
            starts.push(i);
        }
    }
    let mut messages = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(lines.len());
        messages.push(parse_message(&lines[start + 1..end], source_name)?);
    }
    Ok(messages)
}

fn parse_message(lines: &[&str], source_name: &str) -> MailResult<Email> {
    let malformed = |details: String| MailError::Malformed {
        source_name: source_name.to_string(),
        details,
    };

    let split = lines.iter().position(|l| l.is_empty()).unwrap_or(lines.len());
    let (header_lines, rest) = lines.split_at(split);

    let mut id = None;
    let mut date = None;
    let mut author = None;
    let mut sender = None;
    let mut recipients = Vec::new();
    let mut subject = String::new();
    let mut in_reply_to = None;
    let mut headers = std::collections::BTreeMap::new();

    for line in header_lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(malformed(format!("bad header line {:?}", line)));
        };
        let value = value.trim();
        match name.to_ascii_lowercase().as_str() {
            "message-id" => id = EmailId::parse(value),
            "date" => {
                date = Some(
                    DateTime::parse_from_rfc2822(value)
                        .map_err(|e| malformed(format!("bad date {:?}: {}", value, e)))?
                        .with_timezone(&Utc),
                )
            }
            "from" => author = EmailAddress::parse(value),
            "sender" => sender = EmailAddress::parse(value),
            "to" => {
                recipients = split_address_list(value)
                    .iter()
                    .filter_map(|a| EmailAddress::parse(a))
                    .collect()
            }
            "subject" => subject = value.to_string(),
            "in-reply-to" => in_reply_to = EmailId::parse(value),
            _ => {
                headers.insert(name.to_string(), value.to_string());
            }
        }
    }

    let id = id.ok_or_else(|| malformed("missing Message-Id".to_string()))?;
    let author = author.ok_or_else(|| malformed(format!("missing From in {}", id)))?;
    let date = date.ok_or_else(|| malformed(format!("missing Date in {}", id)))?;

    // Skip the header separator, drop the trailing message separator.
    let mut body_lines: Vec<&str> = rest.iter().skip(1).copied().collect();
    if body_lines.last().is_some_and(|l| l.is_empty()) {
        body_lines.pop();
    }
    let body = body_lines
        .iter()
        .map(|line| {
            if line.starts_with('>') && is_separator_like(&line[1..]) {
                &line[1..]
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Email {
        sender: sender.unwrap_or_else(|| author.clone()),
        id,
        date,
        author,
        recipients,
        subject,
        body,
        in_reply_to,
        headers,
    })
}

/// `From ` optionally preceded by any number of `>`.
fn is_separator_like(line: &str) -> bool {
    line.trim_start_matches('>').starts_with("From ")
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn quoted_address(address: &EmailAddress) -> String {
    match &address.full_name {
        Some(name) if name.contains(',') => format!("\"{}\" <{}>", name, address.address),
        _ => address.to_string(),
    }
}

/// Splits a header address list on commas outside quotes and angle brackets.
fn split_address_list(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    for c in value.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
