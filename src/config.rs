//! Bot configuration.
//!
//! A TOML document with optional `[mlbridge]` and `[pr]` tables is deserialized
//! into raw file structs, then compiled into validated settings: regular
//! expressions are compiled, addresses parsed and repository names checked.
//!
//! ```toml
//! [mlbridge]
//! email = "Bridge Bot <bridge@openjdk.org>"
//! archive_url = "https://git.example.org/mlbridge-archive.git"
//! repositories = ["openjdk/jdk"]
//! ready_labels = ["rfr"]
//!
//! [mlbridge.ready_comments]
//! openjdk-bot = "<!-- welcome -->"
//!
//! [[mlbridge.lists]]
//! address = "core-dev@openjdk.org"
//! labels = ["core"]
//!
//! [pr]
//! email = "PR Bot <pr-bot@openjdk.org>"
//! repositories = ["openjdk/jdk"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::email::EmailAddress;
use crate::git::{CommitIdentity, RemoteRef};
use crate::types::RepoId;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid regular expression in {field}: {source}")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid email address in {field}: {value:?}")]
    InvalidAddress { field: String, value: String },

    #[error("invalid repository name {0:?}, expected owner/repo")]
    InvalidRepository(String),

    #[error("mlbridge.cooldown_secs = {0} is longer than one week")]
    CooldownTooLong(u64),
}

/// Longest accepted mirroring cooldown (one week).
pub const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 60 * 60;

// ─── File format ───

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    mlbridge: Option<BridgeFile>,
    pr: Option<PullRequestBotFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeFile {
    email: String,
    archive_url: String,
    #[serde(default = "default_archive_ref")]
    archive_ref: String,
    repositories: Vec<String>,
    #[serde(default)]
    lists: Vec<ListFile>,
    #[serde(default)]
    ignored_users: BTreeSet<String>,
    #[serde(default)]
    ignored_comments: Vec<String>,
    #[serde(default)]
    ready_labels: BTreeSet<String>,
    #[serde(default)]
    ready_comments: BTreeMap<String, String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    cooldown_secs: u64,
    #[serde(default)]
    repo_in_subject: bool,
    branch_in_subject: Option<String>,
    webrev_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListFile {
    address: String,
    #[serde(default)]
    labels: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PullRequestBotFile {
    email: String,
    repositories: Vec<String>,
}

fn default_archive_ref() -> String {
    "master".to_string()
}

// ─── Compiled settings ───

/// A mailing list and the labels that route a pull request to it.
#[derive(Debug, Clone)]
pub struct MailingListRule {
    pub address: EmailAddress,

    /// Empty means every pull request goes to this list.
    pub labels: BTreeSet<String>,
}

impl MailingListRule {
    /// True if the rule is unconditional or shares any label with `labels`.
    pub fn matches(&self, labels: &BTreeSet<String>) -> bool {
        self.labels.is_empty() || self.labels.iter().any(|l| labels.contains(l))
    }
}

/// Settings for the mailing-list bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Sender of archived and relayed mail, also the archive commit identity.
    pub email: EmailAddress,
    pub archive: RemoteRef,
    pub repositories: Vec<RepoId>,
    pub lists: Vec<MailingListRule>,
    pub ignored_users: BTreeSet<String>,
    pub ignored_comments: Vec<Regex>,
    pub ready_labels: BTreeSet<String>,
    pub ready_comments: BTreeMap<String, Regex>,
    /// Headers applied to every relayed message.
    pub headers: BTreeMap<String, String>,
    pub cooldown: chrono::Duration,
    pub repo_in_subject: bool,
    /// Target branches whose name goes into the subject. Full match.
    pub branch_in_subject: Regex,
    pub webrev_base_url: Option<String>,
}

impl BridgeConfig {
    /// Identity used for archive commits and rebases.
    pub fn commit_identity(&self) -> CommitIdentity {
        identity_of(&self.email)
    }

    /// Lists a pull request with these labels is sent to.
    pub fn recipients(&self, labels: &BTreeSet<String>) -> Vec<EmailAddress> {
        self.lists
            .iter()
            .filter(|rule| rule.matches(labels))
            .map(|rule| rule.address.clone())
            .collect()
    }
}

/// Settings for the pull request command bot.
#[derive(Debug, Clone)]
pub struct PullRequestBotConfig {
    pub email: EmailAddress,
    pub repositories: Vec<RepoId>,
}

impl PullRequestBotConfig {
    pub fn commit_identity(&self) -> CommitIdentity {
        identity_of(&self.email)
    }
}

fn identity_of(address: &EmailAddress) -> CommitIdentity {
    CommitIdentity::new(
        address
            .full_name
            .clone()
            .unwrap_or_else(|| address.address.clone()),
        address.address.clone(),
    )
}

/// The complete configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub mlbridge: Option<BridgeConfig>,
    pub pr: Option<PullRequestBotConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(Config {
            mlbridge: file.mlbridge.map(compile_bridge).transpose()?,
            pr: file.pr.map(compile_pr).transpose()?,
        })
    }
}

fn compile_bridge(file: BridgeFile) -> Result<BridgeConfig, ConfigError> {
    let lists = file
        .lists
        .into_iter()
        .map(|list| {
            Ok(MailingListRule {
                address: parse_address("mlbridge.lists.address", &list.address)?,
                labels: list.labels,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let ignored_comments = file
        .ignored_comments
        .iter()
        .map(|pattern| compile("mlbridge.ignored_comments", pattern))
        .collect::<Result<Vec<_>, _>>()?;

    let ready_comments = file
        .ready_comments
        .iter()
        .map(|(user, pattern)| {
            let field = format!("mlbridge.ready_comments.{}", user);
            Ok((user.clone(), compile(&field, pattern)?))
        })
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    // Anchored so the configured pattern must match the whole branch name.
    let branch_pattern = file.branch_in_subject.as_deref().unwrap_or("a^");
    let branch_in_subject = compile(
        "mlbridge.branch_in_subject",
        &format!("^(?:{})$", branch_pattern),
    )?;

    Ok(BridgeConfig {
        email: parse_address("mlbridge.email", &file.email)?,
        archive: RemoteRef::new(file.archive_url, file.archive_ref),
        repositories: parse_repositories(&file.repositories)?,
        lists,
        ignored_users: file.ignored_users,
        ignored_comments,
        ready_labels: file.ready_labels,
        ready_comments,
        headers: file.headers,
        cooldown: parse_cooldown(file.cooldown_secs)?,
        repo_in_subject: file.repo_in_subject,
        branch_in_subject,
        webrev_base_url: file.webrev_base_url,
    })
}

fn compile_pr(file: PullRequestBotFile) -> Result<PullRequestBotConfig, ConfigError> {
    Ok(PullRequestBotConfig {
        email: parse_address("pr.email", &file.email)?,
        repositories: parse_repositories(&file.repositories)?,
    })
}

fn parse_cooldown(secs: u64) -> Result<chrono::Duration, ConfigError> {
    if secs > MAX_COOLDOWN_SECS {
        return Err(ConfigError::CooldownTooLong(secs));
    }
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(ConfigError::CooldownTooLong(secs))
}

fn compile(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        field: field.to_string(),
        source,
    })
}

fn parse_address(field: &str, value: &str) -> Result<EmailAddress, ConfigError> {
    EmailAddress::parse(value).ok_or_else(|| ConfigError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_repositories(names: &[String]) -> Result<Vec<RepoId>, ConfigError> {
    names
        .iter()
        .map(|name| RepoId::parse(name).ok_or_else(|| ConfigError::InvalidRepository(name.clone())))
        .collect()
}
