//! Process-lifetime memory of which pull requests changed since the last poll.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::types::{PrNumber, PullRequest, RepoId};

type Key = (RepoId, PrNumber);

#[derive(Debug, Default)]
struct Entry {
    last_seen: Option<DateTime<Utc>>,
    retry_at: Option<DateTime<Utc>>,
}

/// Tracks the last-seen update time of each pull request.
///
/// Losing this on restart only costs one redundant archive run per pull request.
#[derive(Debug, Default)]
pub struct PullRequestUpdateCache {
    entries: Mutex<HashMap<Key, Entry>>,
}

impl PullRequestUpdateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `pr` changed since it was last seen, or a scheduled retry is due.
    /// Records the current update time.
    pub fn needs_update(&self, pr: &PullRequest, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key(pr)).or_default();

        let retry_due = entry.retry_at.is_some_and(|at| at <= now);
        if retry_due {
            entry.retry_at = None;
        }
        let changed = entry.last_seen != Some(pr.updated_at);
        entry.last_seen = Some(pr.updated_at);
        changed || retry_due
    }

    /// Forgets `pr` so the next poll runs it again.
    pub fn invalidate(&self, pr: &PullRequest) {
        self.entries.lock().remove(&key(pr));
    }

    /// Makes `pr` due again at `at`, keeping the earliest pending retry.
    pub fn retry_at(&self, pr: &PullRequest, at: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key(pr)).or_default();
        entry.retry_at = Some(match entry.retry_at {
            Some(existing) => existing.min(at),
            None => at,
        });
    }
}

fn key(pr: &PullRequest) -> Key {
    (pr.repo.clone(), pr.number)
}
