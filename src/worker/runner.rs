//! The polling runner.
//!
//! Each round asks every bot for its periodic items, then drains the queue:
//! items run on blocking threads (`spawn_blocking`), each with its own scratch
//! directory, and never overlap with a conflicting item. Follow-ups join the same
//! round. Failures, including panics, fire the item's failure hook and are
//! logged; they never stop the runner.
//!
//! Every blocking task is awaited alongside its queue ticket, so a task that
//! dies still releases its in-flight slot.

use std::fmt;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::work::{WorkError, WorkItem, WorkOutcome};

use super::poll::PollConfig;
use super::queue::{Ticket, WorkQueue};

/// A bot that produces work from live external state.
pub trait Bot: Send + Sync + fmt::Display {
    /// Items to run this round. Called on a blocking thread.
    fn periodic_items(&self) -> Result<Vec<Box<dyn WorkItem>>, WorkError>;
}

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll: PollConfig,

    /// Maximum number of items running at once.
    pub max_concurrency: usize,

    /// Parent directory for per-item scratch directories. System temp if unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            poll: PollConfig::from_env(),
            max_concurrency: 4,
            scratch_root: None,
        }
    }
}

/// Counts from one polling round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub succeeded: usize,
    pub failed: usize,

    /// Earliest retry instant requested by any item.
    pub retry_at: Option<DateTime<Utc>>,
}

impl RoundSummary {
    fn note_retry(&mut self, at: Option<DateTime<Utc>>) {
        self.retry_at = match (self.retry_at, at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Polls bots and runs their work.
pub struct Runner {
    bots: Vec<Arc<dyn Bot>>,
    config: RunnerConfig,
}

type Finished = (Ticket, Result<Result<WorkOutcome, WorkError>, JoinError>);

impl Runner {
    pub fn new(bots: Vec<Arc<dyn Bot>>, config: RunnerConfig) -> Self {
        Runner { bots, config }
    }

    fn name(&self) -> String {
        self.bots
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Polls every bot once and runs all resulting work, follow-ups included.
    pub async fn run_once(&self) -> RoundSummary {
        let mut queue = WorkQueue::new();
        for bot in &self.bots {
            let polled = Arc::clone(bot);
            match tokio::task::spawn_blocking(move || polled.periodic_items()).await {
                Ok(Ok(items)) => {
                    debug!(bot = %bot, items = items.len(), "Polled bot");
                    for item in items {
                        queue.push(item);
                    }
                }
                Ok(Err(e)) => error!(bot = %bot, error = %e, "Failed to poll bot"),
                Err(e) => error!(bot = %bot, error = %e, "Bot poll panicked"),
            }
        }
        self.drain(queue).await
    }

    async fn drain(&self, mut queue: WorkQueue) -> RoundSummary {
        let mut summary = RoundSummary::default();
        let mut running: JoinSet<Finished> = JoinSet::new();
        let limit = self.config.max_concurrency.max(1);

        while !queue.is_idle() {
            while running.len() < limit {
                let Some((ticket, item)) = queue.start_next() else {
                    break;
                };
                let scratch_root = self.config.scratch_root.clone();
                let task =
                    tokio::task::spawn_blocking(move || execute(item.as_ref(), scratch_root));
                running.spawn(async move { (ticket, task.await) });
            }

            let Some(joined) = running.join_next().await else {
                // Nothing running and nothing startable cannot happen: a pending
                // item always runs against an empty in-flight set.
                warn!(pending = queue.pending_len(), "Queue stalled");
                break;
            };
            let (ticket, result) = match joined {
                Ok((ticket, result)) => (ticket, settle(result)),
                Err(e) => {
                    // The waiting task only ends this way when the runtime shuts down.
                    error!(error = %e, "Work item task failed to join");
                    summary.failed += 1;
                    continue;
                }
            };
            let Some(item) = queue.finish(ticket) else {
                continue;
            };
            match result {
                Ok(outcome) => {
                    summary.succeeded += 1;
                    summary.note_retry(outcome.retry_at);
                    for follow_up in outcome.follow_ups {
                        queue.push(follow_up);
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(item = %item, error = %e, "Work item failed");
                    let hook_item = Arc::clone(&item);
                    let hook = tokio::task::spawn_blocking(move || {
                        catch_unwind(AssertUnwindSafe(|| hook_item.handle_failure(&e)))
                    })
                    .await;
                    if !matches!(hook, Ok(Ok(()))) {
                        error!(item = %item, "Failure hook panicked");
                    }
                }
            }
        }
        summary
    }

    /// Runs rounds until `shutdown` is cancelled.
    ///
    /// The wait between rounds is the jittered poll interval, shortened when an
    /// item asked to be retried sooner. A round in progress always completes.
    pub async fn run(&self, shutdown: CancellationToken) {
        let name = self.name();
        info!(bots = %name, "Runner started");
        while !shutdown.is_cancelled() {
            let summary = self.run_once().await;
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Polling round finished"
            );

            let mut delay = self.config.poll.poll_interval_with_jitter(&name);
            if let Some(at) = summary.retry_at {
                let until = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                delay = delay.min(until);
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Runner stopped");
    }
}

/// Runs one item in a fresh scratch directory.
fn execute(item: &dyn WorkItem, scratch_root: Option<PathBuf>) -> Result<WorkOutcome, WorkError> {
    let scratch = match &scratch_root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            tempfile::Builder::new()
                .prefix("forge-bridge-")
                .tempdir_in(root)?
        }
        None => tempfile::Builder::new().prefix("forge-bridge-").tempdir()?,
    };
    debug!(item = %item, scratch = %scratch.path().display(), "Running work item");
    item.run(scratch.path())
}

/// The item's result from its blocking task, with panics turned into errors.
fn settle(
    joined: Result<Result<WorkOutcome, WorkError>, JoinError>,
) -> Result<WorkOutcome, WorkError> {
    match joined {
        Ok(result) => result,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => Err(WorkError::Panicked(panic_message(payload.as_ref()))),
            Err(e) => Err(WorkError::Io(std::io::Error::other(e))),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
