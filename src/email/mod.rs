//! Email messages and mailing lists.
//!
//! The archive stores every mirrored message as an email in a per-PR mbox file;
//! the same messages are relayed to the real mailing list. Both sides are reached
//! through the [`MailingList`] trait.

pub mod mbox;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mbox::MboxList;

/// Prefix of internal tracking headers. Never relayed to the real list.
pub const TRACKING_HEADER_PREFIX: &str = "PR-";

/// Errors from mailing list operations.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message in {source_name}: {details}")]
    Malformed { source_name: String, details: String },

    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Result type for mailing list operations.
pub type MailResult<T> = Result<T, MailError>;

/// An email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmailAddress {
    pub full_name: Option<String>,
    pub address: String,
}

impl EmailAddress {
    pub fn new(full_name: impl Into<String>, address: impl Into<String>) -> Self {
        EmailAddress {
            full_name: Some(full_name.into()),
            address: address.into(),
        }
    }

    pub fn bare(address: impl Into<String>) -> Self {
        EmailAddress {
            full_name: None,
            address: address.into(),
        }
    }

    /// Parses `Full Name <local@domain>` or a bare `local@domain`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(open) = s.rfind('<') {
            let rest = &s[open + 1..];
            let close = rest.find('>')?;
            let address = rest[..close].trim();
            if !address.contains('@') {
                return None;
            }
            let name = s[..open].trim().trim_matches('"').trim();
            return Some(EmailAddress {
                full_name: (!name.is_empty()).then(|| name.to_string()),
                address: address.to_string(),
            });
        }
        if s.contains('@') && !s.contains(char::is_whitespace) {
            return Some(EmailAddress::bare(s));
        }
        None
    }

    /// The part after `@`.
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("")
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.full_name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// A message id, stored without the surrounding angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn new(local: impl fmt::Display, domain: &str) -> Self {
        EmailId(format!("{}@{}", local, domain))
    }

    /// Parses `<id>` (brackets optional).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('<').trim_end_matches('>');
        (!s.is_empty()).then(|| EmailId(s.to_string()))
    }
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// An email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub id: EmailId,
    pub date: DateTime<Utc>,
    pub author: EmailAddress,
    pub sender: EmailAddress,
    pub recipients: Vec<EmailAddress>,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<EmailId>,
    /// Extra headers. Names are kept as given; lookups are case-insensitive.
    pub headers: BTreeMap<String, String>,
}

impl Email {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Copy of this message suitable for the public list.
    ///
    /// Tracking headers (`PR-*`) are stripped, `extra_headers` are applied on top of
    /// the remaining ones and the recipient list is replaced.
    pub fn relay_copy(
        &self,
        extra_headers: &BTreeMap<String, String>,
        recipients: &[EmailAddress],
    ) -> Email {
        let mut headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .filter(|(name, _)| !name.starts_with(TRACKING_HEADER_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, value) in extra_headers {
            headers.insert(name.clone(), value.clone());
        }
        Email {
            headers,
            recipients: recipients.to_vec(),
            ..self.clone()
        }
    }
}

/// A thread of messages: a root and everything replying to it, in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Email>,
}

impl Conversation {
    pub fn new(first: Email) -> Self {
        Conversation {
            messages: vec![first],
        }
    }

    pub fn first(&self) -> &Email {
        &self.messages[0]
    }

    pub fn push(&mut self, email: Email) {
        self.messages.push(email);
    }

    pub fn contains(&self, id: &EmailId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn all_messages(&self) -> &[Email] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Email> {
        self.messages
    }
}

/// A mailing list that can be posted to and read back.
pub trait MailingList: Send + Sync {
    fn post(&self, email: &Email) -> MailResult<()>;

    /// Conversations whose first message is newer than `max_age`.
    fn conversations(&self, max_age: Duration) -> MailResult<Vec<Conversation>>;
}

/// Groups messages into threads by following `In-Reply-To`.
///
/// Messages replying to an id that is not present start their own thread.
pub fn thread_messages(messages: Vec<Email>) -> Vec<Conversation> {
    let mut conversations: Vec<Conversation> = Vec::new();
    for message in messages {
        let parent = message
            .in_reply_to
            .as_ref()
            .and_then(|parent| conversations.iter_mut().find(|c| c.contains(parent)));
        match parent {
            Some(conversation) => conversation.push(message),
            None => conversations.push(Conversation::new(message)),
        }
    }
    conversations
}
