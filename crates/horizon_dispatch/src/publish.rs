//! Per-publish configuration and its pool.
//!
//! Each event type owns a staging slot that fluent calls write into and a
//! small pool of cleared configs. Publishing moves the staged config out,
//! puts a cleared one in its place before any handler runs, and hands the
//! moved-out config to the dispatch loop inside a lease. Nested
//! publishes therefore never see or overwrite an outer publish's settings,
//! and the lease returns the config to the pool however dispatch ends.

use crate::bus::PoolStats;
use crate::filter::{Filter, SubscriberView};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use tracing::trace;

/// Settings applied to a single publish of `E`.
pub struct PublishConfig<E> {
    cancelable: bool,
    filters: SmallVec<[Filter; 4]>,
    _event: PhantomData<fn(E)>,
}

impl<E> PublishConfig<E> {
    pub(crate) fn new() -> Self {
        Self {
            cancelable: false,
            filters: SmallVec::new(),
            _event: PhantomData,
        }
    }

    /// Whether a handler returning `false` stops propagation.
    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// True when no setting differs from a fresh config.
    pub fn is_clear(&self) -> bool {
        !self.cancelable && self.filters.is_empty()
    }

    /// True when any filter excludes the subscriber. Filters run in the
    /// order they were added and stop at the first match.
    pub fn is_filtered(&self, subscriber: &SubscriberView<'_>) -> bool {
        self.filters.iter().any(|filter| filter.excludes(subscriber))
    }

    pub(crate) fn set_cancelable(&mut self) {
        self.cancelable = true;
    }

    pub(crate) fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub(crate) fn clear(&mut self) {
        self.cancelable = false;
        self.filters.clear();
    }
}

impl<E> fmt::Debug for PublishConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishConfig")
            .field("cancelable", &self.cancelable)
            .field("filters", &self.filters)
            .finish()
    }
}

/// Bounded free list of cleared configs for one event type.
///
/// Acquiring never blocks: an empty pool allocates. Releasing into a full
/// pool drops the config.
pub(crate) struct ConfigPool<E> {
    free: RefCell<Vec<PublishConfig<E>>>,
    capacity: usize,
    created: Cell<usize>,
}

impl<E> ConfigPool<E> {
    pub(crate) fn new(capacity: usize, preallocate: usize) -> Self {
        let prefill = preallocate.min(capacity);
        let mut free = Vec::with_capacity(capacity);
        free.extend((0..prefill).map(|_| PublishConfig::new()));
        Self {
            free: RefCell::new(free),
            capacity,
            created: Cell::new(prefill),
        }
    }

    pub(crate) fn acquire(&self) -> PublishConfig<E> {
        if let Some(config) = self.free.borrow_mut().pop() {
            return config;
        }
        self.created.set(self.created.get() + 1);
        trace!("🧩 Pool empty, allocating publish config #{}", self.created.get());
        PublishConfig::new()
    }

    pub(crate) fn release(&self, mut config: PublishConfig<E>) {
        config.clear();
        let mut free = self.free.borrow_mut();
        if free.len() < self.capacity {
            free.push(config);
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            pooled: self.free.borrow().len(),
            created: self.created.get(),
            capacity: self.capacity,
        }
    }
}

/// Staging slot plus pool for one event type.
pub(crate) struct ConfigSlots<E> {
    staging: RefCell<Option<PublishConfig<E>>>,
    pool: ConfigPool<E>,
}

impl<E> ConfigSlots<E> {
    pub(crate) fn new(capacity: usize, preallocate: usize) -> Self {
        Self {
            staging: RefCell::new(None),
            pool: ConfigPool::new(capacity, preallocate),
        }
    }

    /// Applies a fluent setting to the staged config, creating it on first use.
    pub(crate) fn stage(&self, apply: impl FnOnce(&mut PublishConfig<E>)) {
        let mut staging = self.staging.borrow_mut();
        let config = staging.get_or_insert_with(|| self.pool.acquire());
        apply(config);
    }

    /// Clears whatever a fluent chain left behind without publishing.
    pub(crate) fn discard_staged(&self) {
        if let Some(config) = self.staging.borrow_mut().as_mut() {
            config.clear();
        }
    }

    /// Moves the staged config out and installs a cleared one in its place.
    pub(crate) fn detach_for_publish(&self) -> ConfigLease<'_, E> {
        let replacement = self.pool.acquire();
        let staged = self.staging.borrow_mut().replace(replacement);
        let config = staged.unwrap_or_else(|| self.pool.acquire());
        ConfigLease {
            slots: self,
            config: Some(config),
        }
    }

    pub(crate) fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    #[cfg(test)]
    pub(crate) fn with_staged<R>(&self, inspect: impl FnOnce(Option<&PublishConfig<E>>) -> R) -> R {
        inspect(self.staging.borrow().as_ref())
    }
}

/// A detached config owned by one in-flight publish.
///
/// Dropping the lease clears the config and returns it to the pool, which
/// covers normal completion, early cancelation, handler panics and dropped
/// async publish futures alike.
pub(crate) struct ConfigLease<'a, E> {
    slots: &'a ConfigSlots<E>,
    config: Option<PublishConfig<E>>,
}

impl<E> Deref for ConfigLease<'_, E> {
    type Target = PublishConfig<E>;

    fn deref(&self) -> &PublishConfig<E> {
        match &self.config {
            Some(config) => config,
            None => unreachable!("publish config is only taken when the lease drops"),
        }
    }
}

impl<E> Drop for ConfigLease<'_, E> {
    fn drop(&mut self) {
        if let Some(config) = self.config.take() {
            self.slots.pool.release(config);
        }
    }
}
