//! Pending and in-flight work, ordered FIFO and gated by the conflict predicate.
//!
//! An item is runnable only when it is `concurrent_with` every in-flight item.
//! Enqueueing an item that conflicts with a pending one replaces the pending one
//! in place: both were derived from live state and the newer snapshot wins.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::work::WorkItem;

/// Handle for an item that has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// The runner's queue of work.
#[derive(Default)]
pub struct WorkQueue {
    pending: VecDeque<Arc<dyn WorkItem>>,
    in_flight: Vec<(Ticket, Arc<dyn WorkItem>)>,
    next_ticket: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item. Returns false if it replaced a conflicting pending item.
    pub fn push(&mut self, item: Box<dyn WorkItem>) -> bool {
        let item: Arc<dyn WorkItem> = Arc::from(item);
        if let Some(slot) = self
            .pending
            .iter_mut()
            .find(|pending| !pending.concurrent_with(item.as_ref()))
        {
            *slot = item;
            return false;
        }
        self.pending.push_back(item);
        true
    }

    /// Removes and returns the first pending item that may start now.
    pub fn start_next(&mut self) -> Option<(Ticket, Arc<dyn WorkItem>)> {
        let index = self.pending.iter().position(|candidate| {
            self.in_flight
                .iter()
                .all(|(_, running)| candidate.concurrent_with(running.as_ref()))
        })?;
        let item = self.pending.remove(index)?;
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight.push((ticket, Arc::clone(&item)));
        Some((ticket, item))
    }

    /// Marks an item as no longer running.
    pub fn finish(&mut self, ticket: Ticket) -> Option<Arc<dyn WorkItem>> {
        let index = self.in_flight.iter().position(|(t, _)| *t == ticket)?;
        Some(self.in_flight.swap_remove(index).1)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}
