//! Per (event, subscriber type) registries.
//!
//! A registry keeps the live instances of one subscriber type in
//! registration order together with the handlers bound for one event type.
//! The bus sees registries through two object-safe views: [`SubscriberGroup`]
//! for dispatch, keyed by event type, and [`Route`] for start/stop listening,
//! keyed by subscriber type.

use crate::binding::{BindingInfo, HandlerInfo, HandlerKind};
use crate::bus::EventBus;
use crate::error::{DispatchError, Result};
use crate::event::Event;
use crate::filter::{SubscriberId, SubscriberView};
use crate::priority::Priority;
use crate::publish::PublishConfig;
use futures::future::{FutureExt, LocalBoxFuture};
use std::any::TypeId;
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use tracing::trace;

pub(crate) type SyncHandler<E, S> = Box<dyn Fn(&S, &E, &EventBus) -> bool>;
pub(crate) type AsyncHandler<E, S> =
    Box<dyn Fn(Rc<S>, E, EventBus) -> LocalBoxFuture<'static, bool>>;

/// Static description of one handler group.
#[derive(Debug, Clone)]
pub(crate) struct GroupDescriptor {
    pub event: &'static str,
    pub subscriber: &'static str,
    pub priority: Priority,
    pub order: u32,
}

struct Bound<H> {
    handler: H,
    returns_flag: bool,
}

/// Dispatch-side view of a registry.
pub(crate) trait SubscriberGroup<E> {
    fn descriptor(&self) -> &GroupDescriptor;

    fn binding_info(&self) -> BindingInfo;

    fn live_count(&self) -> usize;

    /// Runs the sync handler over every live, unfiltered subscriber.
    /// Returns false when a cancelable publish was stopped in this group.
    /// A group with no sync handler completes without doing anything.
    fn invoke(&self, bus: &EventBus, event: &E, config: &PublishConfig<E>) -> bool;

    /// Async counterpart of [`invoke`](Self::invoke); `None` when the group
    /// has no async handler and its sync handler should be used instead.
    fn invoke_async<'a>(
        &'a self,
        bus: &'a EventBus,
        event: &'a E,
        config: &'a PublishConfig<E>,
    ) -> Option<LocalBoxFuture<'a, bool>>;
}

/// Listening-side view of a registry.
pub(crate) trait Route<S> {
    fn event_type(&self) -> TypeId;

    fn event_name(&self) -> &'static str;

    fn attach(&self, subscriber: &Rc<S>) -> bool;

    fn detach(&self, id: SubscriberId) -> bool;

    fn is_attached(&self, id: SubscriberId) -> bool;
}

/// Dead entries are swept once the list reaches this length, even if no
/// dispatch has noticed them yet.
const PRUNE_FLOOR: usize = 16;

struct LiveSet<S> {
    entries: Vec<Weak<S>>,
    index: HashMap<SubscriberId, usize>,
    /// Some slot was emptied in place during a dispatch pass.
    vacated: bool,
    /// Length at which the next `register` sweeps dead entries.
    prune_at: usize,
}

impl<S> LiveSet<S> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            vacated: false,
            prune_at: PRUNE_FLOOR,
        }
    }

    fn insert(&mut self, subscriber: &Rc<S>) -> bool {
        let id = SubscriberId::of(subscriber);
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.entries.len());
        self.entries.push(Rc::downgrade(subscriber));
        true
    }

    /// Removes the instance. While a pass is walking the list, the slot is
    /// emptied in place so no entry changes position under the walk.
    fn remove(&mut self, id: SubscriberId, walking: bool) -> bool {
        let Some(position) = self.index.remove(&id) else {
            return false;
        };
        if walking {
            if let Some(entry) = self.entries.get_mut(position) {
                *entry = Weak::new();
                self.vacated = true;
            }
        } else {
            self.entries.swap_remove(position);
            if let Some(moved) = self.entries.get(position) {
                self.index.insert(SubscriberId::of_weak(moved), position);
            }
        }
        true
    }

    /// Drops emptied and dead entries, keeping the survivors in order.
    fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.strong_count() > 0);
        self.index.clear();
        for (position, entry) in self.entries.iter().enumerate() {
            self.index.insert(SubscriberId::of_weak(entry), position);
        }
        self.vacated = false;
        self.prune_at = (self.entries.len() * 2).max(PRUNE_FLOOR);
        before - self.entries.len()
    }
}

/// Marks a dispatch pass over one registry; the outermost pass compacts the
/// list when it ends, including on unwind and when an async pass is dropped.
struct Pass<'a, S> {
    depth: &'a Cell<u32>,
    live: &'a RefCell<LiveSet<S>>,
}

impl<'a, S> Pass<'a, S> {
    fn begin(depth: &'a Cell<u32>, live: &'a RefCell<LiveSet<S>>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth, live }
    }
}

impl<S> Drop for Pass<'_, S> {
    fn drop(&mut self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            let mut live = self.live.borrow_mut();
            if live.vacated {
                live.compact();
            }
        }
    }
}

/// Live instances of `S` plus the handlers bound for `(E, S)`.
pub(crate) struct Registry<E, S> {
    descriptor: GroupDescriptor,
    live: RefCell<LiveSet<S>>,
    saw_dead: Cell<bool>,
    /// Dispatch passes currently walking `live`; nested publishes stack.
    depth: Cell<u32>,
    sync_handler: OnceCell<Bound<SyncHandler<E, S>>>,
    async_handler: OnceCell<Bound<AsyncHandler<E, S>>>,
    _event: PhantomData<fn(E)>,
}

enum Slot<S> {
    Live(Rc<S>),
    Dead,
    End,
}

impl<E: Event, S: 'static> Registry<E, S> {
    pub(crate) fn new(priority: Priority, order: u32) -> Self {
        Self {
            descriptor: GroupDescriptor {
                event: E::event_name(),
                subscriber: std::any::type_name::<S>(),
                priority,
                order,
            },
            live: RefCell::new(LiveSet::new()),
            saw_dead: Cell::new(false),
            depth: Cell::new(0),
            sync_handler: OnceCell::new(),
            async_handler: OnceCell::new(),
            _event: PhantomData,
        }
    }

    /// Installs the sync handler. A second call leaves the first in place.
    pub(crate) fn initialize_sync(
        &self,
        handler: SyncHandler<E, S>,
        returns_flag: bool,
    ) -> Result<()> {
        self.sync_handler
            .set(Bound {
                handler,
                returns_flag,
            })
            .map_err(|_| self.duplicate(HandlerKind::Sync))
    }

    /// Installs the async handler. A second call leaves the first in place.
    pub(crate) fn initialize_async(
        &self,
        handler: AsyncHandler<E, S>,
        returns_flag: bool,
    ) -> Result<()> {
        self.async_handler
            .set(Bound {
                handler,
                returns_flag,
            })
            .map_err(|_| self.duplicate(HandlerKind::Async))
    }

    fn duplicate(&self, kind: HandlerKind) -> DispatchError {
        DispatchError::DuplicateBinding {
            event: self.descriptor.event,
            subscriber: self.descriptor.subscriber,
            kind,
        }
    }

    /// Appends the instance unless it is already present. Outside a
    /// dispatch pass, dead entries are swept first when a pass saw one or the
    /// list has grown past its sweep threshold.
    pub(crate) fn register(&self, subscriber: &Rc<S>) -> bool {
        let mut live = self.live.borrow_mut();
        if !self.walking() {
            let due = live.vacated || live.entries.len() >= live.prune_at;
            if self.saw_dead.replace(false) || due {
                let pruned = live.compact();
                if pruned > 0 {
                    trace!("🧹 Pruned {} dead {} entries", pruned, self.descriptor.subscriber);
                }
            }
        }
        live.insert(subscriber)
    }

    /// Removes the instance if present.
    pub(crate) fn unregister(&self, id: SubscriberId) -> bool {
        let walking = self.walking();
        self.live.borrow_mut().remove(id, walking)
    }

    fn walking(&self) -> bool {
        self.depth.get() > 0
    }

    fn begin_pass(&self) -> Pass<'_, S> {
        Pass::begin(&self.depth, &self.live)
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.live.borrow().index.contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.live.borrow().entries.len()
    }

    /// Reads one slot of the live list. The borrow ends before the caller
    /// runs a handler, so handlers may register or unregister freely.
    fn slot(&self, position: usize) -> Slot<S> {
        match self.live.borrow().entries.get(position) {
            Some(entry) => match entry.upgrade() {
                Some(subscriber) => Slot::Live(subscriber),
                None => Slot::Dead,
            },
            None => Slot::End,
        }
    }

    /// Next live subscriber that passes the filters, advancing `position`.
    fn next_target(
        &self,
        position: &mut usize,
        bus: &EventBus,
        config: &PublishConfig<E>,
    ) -> Option<Rc<S>> {
        loop {
            let slot = self.slot(*position);
            *position += 1;
            match slot {
                Slot::End => return None,
                Slot::Dead => self.saw_dead.set(true),
                Slot::Live(subscriber) => {
                    if config.has_filters() && config.is_filtered(&SubscriberView::new(&subscriber))
                    {
                        bus.counters().record_filtered();
                        continue;
                    }
                    return Some(subscriber);
                }
            }
        }
    }
}

impl<E: Event, S: 'static> SubscriberGroup<E> for Registry<E, S> {
    fn descriptor(&self) -> &GroupDescriptor {
        &self.descriptor
    }

    fn binding_info(&self) -> BindingInfo {
        let mut handlers = Vec::with_capacity(2);
        if let Some(bound) = self.sync_handler.get() {
            handlers.push(HandlerInfo {
                kind: HandlerKind::Sync,
                returns_flag: bound.returns_flag,
            });
        }
        if let Some(bound) = self.async_handler.get() {
            handlers.push(HandlerInfo {
                kind: HandlerKind::Async,
                returns_flag: bound.returns_flag,
            });
        }
        BindingInfo {
            event: self.descriptor.event,
            subscriber: self.descriptor.subscriber,
            priority: self.descriptor.priority,
            order: self.descriptor.order,
            handlers,
        }
    }

    fn live_count(&self) -> usize {
        self.live
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    fn invoke(&self, bus: &EventBus, event: &E, config: &PublishConfig<E>) -> bool {
        let Some(bound) = self.sync_handler.get() else {
            return true;
        };
        let _pass = self.begin_pass();
        let mut position = 0;
        while let Some(subscriber) = self.next_target(&mut position, bus, config) {
            bus.counters().record_invocation();
            let proceed = (bound.handler)(&subscriber, event, bus);
            if config.is_cancelable() && !proceed {
                return false;
            }
        }
        true
    }

    fn invoke_async<'a>(
        &'a self,
        bus: &'a EventBus,
        event: &'a E,
        config: &'a PublishConfig<E>,
    ) -> Option<LocalBoxFuture<'a, bool>> {
        let bound = self.async_handler.get()?;
        let pass = async move {
            let _pass = self.begin_pass();
            let mut position = 0;
            while let Some(subscriber) = self.next_target(&mut position, bus, config) {
                bus.counters().record_invocation();
                let proceed = (bound.handler)(subscriber, event.clone(), bus.clone()).await;
                if config.is_cancelable() && !proceed {
                    return false;
                }
            }
            true
        };
        Some(pass.boxed_local())
    }
}

impl<E: Event, S: 'static> Route<S> for Registry<E, S> {
    fn event_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn event_name(&self) -> &'static str {
        self.descriptor.event
    }

    fn attach(&self, subscriber: &Rc<S>) -> bool {
        self.register(subscriber)
    }

    fn detach(&self, id: SubscriberId) -> bool {
        self.unregister(id)
    }

    fn is_attached(&self, id: SubscriberId) -> bool {
        self.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Tick;

    impl Event for Tick {}

    struct Watcher;

    fn registry() -> Registry<Tick, Watcher> {
        Registry::new(Priority::Medium, 0)
    }

    fn ids(registry: &Registry<Tick, Watcher>) -> Vec<SubscriberId> {
        registry
            .live
            .borrow()
            .entries
            .iter()
            .map(SubscriberId::of_weak)
            .collect()
    }

    #[test]
    fn register_is_idempotent() {
        let registry = registry();
        let a = Rc::new(Watcher);
        assert!(registry.register(&a));
        assert!(!registry.register(&a));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(SubscriberId::of(&a)));
    }

    #[test]
    fn unregister_absent_is_a_no_op() {
        let registry = registry();
        let a = Rc::new(Watcher);
        assert!(!registry.unregister(SubscriberId::of(&a)));
        registry.register(&a);
        assert!(registry.unregister(SubscriberId::of(&a)));
        assert!(!registry.unregister(SubscriberId::of(&a)));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn unregister_swaps_last_entry_into_place() {
        let registry = registry();
        let a = Rc::new(Watcher);
        let b = Rc::new(Watcher);
        let c = Rc::new(Watcher);
        for subscriber in [&a, &b, &c] {
            registry.register(subscriber);
        }

        registry.unregister(SubscriberId::of(&a));
        assert_eq!(ids(&registry), vec![SubscriberId::of(&c), SubscriberId::of(&b)]);

        // the index must follow the moved entry
        assert!(registry.unregister(SubscriberId::of(&c)));
        assert_eq!(ids(&registry), vec![SubscriberId::of(&b)]);
    }

    #[test]
    fn second_initialization_reports_duplicate_and_keeps_first() {
        let registry = registry();
        registry
            .initialize_sync(Box::new(|_, _, _| true), false)
            .unwrap();
        let err = registry
            .initialize_sync(Box::new(|_, _, _| false), true)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::DuplicateBinding {
                kind: HandlerKind::Sync,
                ..
            }
        ));
        let info = registry.binding_info();
        assert_eq!(info.handlers.len(), 1);
        assert!(!info.handlers[0].returns_flag);
    }

    #[test]
    fn removal_during_a_pass_keeps_positions_until_it_ends() {
        let registry = registry();
        let a = Rc::new(Watcher);
        let b = Rc::new(Watcher);
        let c = Rc::new(Watcher);
        for subscriber in [&a, &b, &c] {
            registry.register(subscriber);
        }

        {
            let _outer = registry.begin_pass();
            {
                let _nested = registry.begin_pass();
                assert!(registry.unregister(SubscriberId::of(&a)));
            }
            // still inside the outer pass: c has not moved into a's slot
            assert!(matches!(registry.slot(0), Slot::Dead));
            assert!(matches!(registry.slot(2), Slot::Live(ref s) if Rc::ptr_eq(s, &c)));
            assert!(!registry.contains(SubscriberId::of(&a)));
            assert!(!registry.unregister(SubscriberId::of(&a)));
        }

        assert_eq!(ids(&registry), vec![SubscriberId::of(&b), SubscriberId::of(&c)]);
        assert!(registry.unregister(SubscriberId::of(&c)));
        assert_eq!(ids(&registry), vec![SubscriberId::of(&b)]);
    }

    #[test]
    fn dead_entries_are_swept_without_any_dispatch() {
        let registry = registry();
        let keep = Rc::new(Watcher);
        registry.register(&keep);
        for _ in 0..PRUNE_FLOOR * 4 {
            let gone = Rc::new(Watcher);
            registry.register(&gone);
        }

        assert!(registry.len() <= PRUNE_FLOOR * 2);
        assert_eq!(registry.live_count(), 1);
        assert!(registry.contains(SubscriberId::of(&keep)));
    }

    #[test]
    fn dead_entries_are_pruned_on_next_register() {
        let registry = registry();
        let keep = Rc::new(Watcher);
        registry.register(&keep);
        {
            let gone = Rc::new(Watcher);
            registry.register(&gone);
        }
        assert_eq!(registry.len(), 2);

        assert!(matches!(registry.slot(1), Slot::Dead));
        registry.saw_dead.set(true);

        let fresh = Rc::new(Watcher);
        registry.register(&fresh);
        assert_eq!(
            ids(&registry),
            vec![SubscriberId::of(&keep), SubscriberId::of(&fresh)]
        );
    }
}
