//! Polling configuration for the runner.
//!
//! Bots are pull-based: every round asks each bot for fresh work derived from
//! live forge state. The round interval gets deterministic jitter so several
//! bot processes restarting together do not poll in lockstep.

use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Default interval between polling rounds (1 minute).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default jitter percentage (0-100).
const DEFAULT_JITTER_PERCENT: u8 = 20;

/// Environment variable overriding the poll interval, in seconds.
pub const POLL_INTERVAL_ENV: &str = "FORGE_BRIDGE_POLL_INTERVAL_SECS";

/// Configuration for polling rounds.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval between polling rounds.
    ///
    /// Default: 1 minute. Configure via `FORGE_BRIDGE_POLL_INTERVAL_SECS`.
    pub poll_interval: Duration,

    /// Jitter percentage to add to the poll interval (0-100).
    pub jitter_percent: u8,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    pub fn new() -> Self {
        PollConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            jitter_percent: DEFAULT_JITTER_PERCENT,
        }
    }

    /// Reads `FORGE_BRIDGE_POLL_INTERVAL_SECS`; other values use defaults.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(POLL_INTERVAL_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        let secs = value
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        PollConfig {
            poll_interval: Duration::from_secs(secs),
            ..Self::new()
        }
    }

    /// The poll interval with jitter for a given key (typically the runner name).
    ///
    /// `interval * (1 + (hash(key) % jitter_percent) / 100)`
    pub fn poll_interval_with_jitter<K: Hash + ?Sized>(&self, key: &K) -> Duration {
        Duration::from_secs_f64(self.poll_interval.as_secs_f64() * self.jitter_factor(key))
    }

    fn jitter_factor<K: Hash + ?Sized>(&self, key: &K) -> f64 {
        if self.jitter_percent == 0 {
            return 1.0;
        }
        let mut hasher = std::hash::DefaultHasher::new();
        key.hash(&mut hasher);
        let jitter = (hasher.finish() % self.jitter_percent as u64) as f64 / 100.0;
        1.0 + jitter
    }
}
