//! Scheduling of work items.
//!
//! The runner polls each [`Bot`] for work derived from live external state and
//! executes the resulting items in parallel, never running two conflicting items
//! at the same time.
//!
//! # Module Structure
//!
//! - [`queue`]: Pending and in-flight items gated by the conflict predicate
//! - [`poll`]: Polling interval and jitter
//! - [`runner`]: The bot polling loop

mod poll;
mod queue;
mod runner;


pub use poll::{POLL_INTERVAL_ENV, PollConfig};
pub use queue::{Ticket, WorkQueue};
pub use runner::{Bot, RoundSummary, Runner, RunnerConfig};
