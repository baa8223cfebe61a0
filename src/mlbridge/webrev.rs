//! Webrev links and the summary comment that lists them.
//!
//! The bot keeps exactly one comment per pull request listing every webrev
//! revision, newest first. The comment is found by its marker, not by a stored id.

use std::fmt;

use tracing::debug;

use crate::forge::{Forge, ForgeResult};
use crate::types::{Comment, HostUser, PullRequest, Sha};
use crate::work::WorkError;

pub const WEBREV_COMMENT_MARKER: &str = "<!-- mlbridge webrev comment -->";
pub const WEBREV_HEADER_MARKER: &str = "<!-- mlbridge webrev header -->";
pub const WEBREV_LIST_MARKER: &str = "<!-- mlbridge webrev list -->";

/// One link to a generated diff view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebrevDescription {
    pub label: String,
    pub uri: String,
}

impl WebrevDescription {
    pub fn new(label: impl Into<String>, uri: impl Into<String>) -> Self {
        WebrevDescription {
            label: label.into(),
            uri: uri.into(),
        }
    }
}

impl fmt::Display for WebrevDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", self.label, self.uri)
    }
}

/// Produces webrev links for a revision of a pull request.
pub trait WebrevGenerator: Send + Sync {
    /// `index` counts revisions from zero; `previous` is the head of the last
    /// archived revision, if any.
    fn generate(
        &self,
        pr: &PullRequest,
        index: usize,
        previous: Option<&Sha>,
        head: &Sha,
    ) -> Result<Vec<WebrevDescription>, WorkError>;
}

/// Links into a webrev server laid out as `<base>/<repo>/<pr>/webrev.<NN>`.
///
/// Without a base URL the forge's own files view is linked instead.
#[derive(Debug, Clone, Default)]
pub struct LinkWebrevGenerator {
    pub base_url: Option<String>,
}

impl LinkWebrevGenerator {
    pub fn new(base_url: Option<String>) -> Self {
        LinkWebrevGenerator { base_url }
    }
}

impl WebrevGenerator for LinkWebrevGenerator {
    fn generate(
        &self,
        pr: &PullRequest,
        index: usize,
        previous: Option<&Sha>,
        head: &Sha,
    ) -> Result<Vec<WebrevDescription>, WorkError> {
        let Some(base) = &self.base_url else {
            return Ok(vec![WebrevDescription::new("Changes", pr.files_url(head))]);
        };
        let root = format!("{}/{}/{}", base.trim_end_matches('/'), pr.repo.repo, pr.number.0);
        let mut webrevs = vec![WebrevDescription::new(
            "Full",
            format!("{}/webrev.{:02}", root, index),
        )];
        if previous.is_some() && index > 0 {
            webrevs.push(WebrevDescription::new(
                "Incremental",
                format!("{}/webrev.{:02}-{:02}", root, index - 1, index),
            ));
        }
        Ok(webrevs)
    }
}

/// Joins links the way they appear in comments and mails.
pub fn describe(webrevs: &[WebrevDescription]) -> String {
    webrevs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" - ")
}

/// What [`sync_webrev_comment`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebrevSync {
    Created,
    Updated,
    Unchanged,
}

/// Adds revision `index` to the summary comment.
///
/// A no-op when the links are already present in the existing comment.
/// Otherwise the new entry goes above the previous list.
pub fn sync_webrev_comment(
    forge: &dyn Forge,
    pr: &PullRequest,
    bot_user: &HostUser,
    comments: &[Comment],
    index: usize,
    webrevs: &[WebrevDescription],
) -> ForgeResult<WebrevSync> {
    let existing = comments
        .iter()
        .find(|c| &c.author == bot_user && c.body.contains(WEBREV_COMMENT_MARKER));
    let links = describe(webrevs);

    let mut body = format!(
        "{}\n{}\n### Webrevs\n{}\n * {:02}: {} ({})\n",
        WEBREV_COMMENT_MARKER,
        WEBREV_HEADER_MARKER,
        WEBREV_LIST_MARKER,
        index,
        links,
        pr.files_url(&pr.head_sha)
    );

    match existing {
        Some(existing) if existing.body.contains(&links) => {
            debug!(pr = %pr.number, "Webrev links already posted");
            Ok(WebrevSync::Unchanged)
        }
        Some(existing) => {
            body.push_str(previous_list(&existing.body));
            forge.update_comment(pr, existing.id, &body)?;
            Ok(WebrevSync::Updated)
        }
        None => {
            forge.add_comment(pr, &body)?;
            Ok(WebrevSync::Created)
        }
    }
}

/// Entries after the list marker line of an existing comment.
fn previous_list(body: &str) -> &str {
    match body.find(WEBREV_LIST_MARKER) {
        Some(at) => {
            let rest = &body[at + WEBREV_LIST_MARKER.len()..];
            rest.strip_prefix('\n').unwrap_or(rest)
        }
        None => "",
    }
}
