//! Statistics tracking for the dispatch bus

use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Bus-wide counters since the bus was built.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Synchronous publishes started
    pub publishes: u64,
    /// Async publishes started
    pub async_publishes: u64,
    /// Handler calls across all publishes
    pub handler_invocations: u64,
    /// Subscribers skipped because a filter excluded them
    pub filtered_skips: u64,
    /// Publishes stopped by a handler returning false
    pub canceled_publishes: u64,
}

/// Config pool state for one event type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Cleared configs waiting in the pool
    pub pooled: usize,
    /// Configs allocated over the pool's lifetime
    pub created: usize,
    /// Maximum number of pooled configs
    pub capacity: usize,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    publishes: Cell<u64>,
    async_publishes: Cell<u64>,
    handler_invocations: Cell<u64>,
    filtered_skips: Cell<u64>,
    canceled_publishes: Cell<u64>,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get().wrapping_add(1));
}

impl DispatchCounters {
    pub(crate) fn record_publish(&self) {
        bump(&self.publishes);
    }

    pub(crate) fn record_async_publish(&self) {
        bump(&self.async_publishes);
    }

    pub(crate) fn record_invocation(&self) {
        bump(&self.handler_invocations);
    }

    pub(crate) fn record_filtered(&self) {
        bump(&self.filtered_skips);
    }

    pub(crate) fn record_cancel(&self) {
        bump(&self.canceled_publishes);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            publishes: self.publishes.get(),
            async_publishes: self.async_publishes.get(),
            handler_invocations: self.handler_invocations.get(),
            filtered_skips: self.filtered_skips.get(),
            canceled_publishes: self.canceled_publishes.get(),
        }
    }
}
