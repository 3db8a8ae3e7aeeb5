//! The binding step: which handler methods exist, for which event types, at
//! which priority.
//!
//! A [`BindingTable`] is filled once at startup and turned into an
//! [`EventBus`]. Each `(event, subscriber type)` pair becomes one handler
//! group backed by a registry holding at most one sync and one async
//! handler. Groups are ordered by priority and then by the order in which
//! their first handler was bound, which makes dispatch order deterministic.
//!
//! ```
//! use horizon_dispatch::{BindingTable, EventBus, Priority, Subscriber, SubscriberBinder};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! #[derive(Debug, Clone)]
//! struct Scored(u32);
//! horizon_dispatch::impl_event!(Scored);
//!
//! #[derive(Default)]
//! struct Scoreboard {
//!     total: Cell<u32>,
//! }
//!
//! impl Scoreboard {
//!     fn on_scored(&self, event: &Scored, _bus: &EventBus) {
//!         self.total.set(self.total.get() + event.0);
//!     }
//! }
//!
//! impl Subscriber for Scoreboard {
//!     fn bind(binder: &mut SubscriberBinder<'_, Self>) -> horizon_dispatch::Result<()> {
//!         binder.on(Priority::High, Self::on_scored)?;
//!         Ok(())
//!     }
//! }
//!
//! let bus = BindingTable::new().subscriber::<Scoreboard>()?.build()?;
//! let board = Rc::new(Scoreboard::default());
//! let _handle = bus.start_listening(&board);
//!
//! assert!(bus.publish(Scored(3))?);
//! assert_eq!(board.total.get(), 3);
//! # Ok::<(), horizon_dispatch::DispatchError>(())
//! ```

use crate::bus::{Channel, EventBus};
use crate::error::Result;
use crate::event::Event;
use crate::priority::Priority;
use crate::registry::{Registry, Route, SubscriberGroup};
use crate::settings::DispatchSettings;
use futures::future::FutureExt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Whether a handler's return value can stop a cancelable publish.
///
/// `()` handlers always continue. `bool` handlers stop a cancelable publish
/// by returning `false`.
pub trait Continuation {
    /// True when the return value carries meaning for cancelation.
    const RETURNS_FLAG: bool;

    fn proceed(self) -> bool;
}

impl Continuation for () {
    const RETURNS_FLAG: bool = false;

    fn proceed(self) -> bool {
        true
    }
}

impl Continuation for bool {
    const RETURNS_FLAG: bool = true;

    fn proceed(self) -> bool {
        self
    }
}

/// Sync or async handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Sync,
    Async,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Sync => f.write_str("sync"),
            HandlerKind::Async => f.write_str("async"),
        }
    }
}

/// One handler inside a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub kind: HandlerKind,
    pub returns_flag: bool,
}

/// Description of one handler group as seen by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub event: &'static str,
    pub subscriber: &'static str,
    pub priority: Priority,
    /// Position of the group's first binding across the whole table.
    pub order: u32,
    /// Bound handlers, sync before async.
    pub handlers: Vec<HandlerInfo>,
}

impl BindingInfo {
    pub fn has(&self, kind: HandlerKind) -> bool {
        self.handlers.iter().any(|handler| handler.kind == kind)
    }
}

/// A subscriber type that declares its own handlers.
///
/// This is the counterpart of annotating handler methods: `bind` lists the
/// methods, their event types and priorities.
pub trait Subscriber: Sized + 'static {
    fn bind(binder: &mut SubscriberBinder<'_, Self>) -> Result<()>;
}

/// Binds handlers for one subscriber type.
pub struct SubscriberBinder<'t, S> {
    table: &'t mut BindingTable,
    _subscriber: PhantomData<fn(S)>,
}

impl<S: 'static> SubscriberBinder<'_, S> {
    /// Binds a sync handler for `E`.
    pub fn on<E, F, R>(&mut self, priority: Priority, handler: F) -> Result<&mut Self>
    where
        E: Event,
        F: Fn(&S, &E, &EventBus) -> R + 'static,
        R: Continuation,
    {
        self.table.bind::<E, S, F, R>(priority, handler)?;
        Ok(self)
    }

    /// Binds an async handler for `E`.
    pub fn on_async<E, F, Fut, R>(&mut self, priority: Priority, handler: F) -> Result<&mut Self>
    where
        E: Event,
        F: Fn(Rc<S>, E, EventBus) -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
        R: Continuation + 'static,
    {
        self.table.bind_async::<E, S, F, Fut, R>(priority, handler)?;
        Ok(self)
    }
}

/// Collects handler bindings and builds the [`EventBus`].
#[derive(Default)]
pub struct BindingTable {
    channels: HashMap<TypeId, Box<dyn ChannelDraft>>,
    routes: HashMap<TypeId, Box<dyn Any>>,
    registries: HashMap<(TypeId, TypeId), Rc<dyn Any>>,
    next_order: u32,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an event type that may have no handlers. Publishing it then
    /// succeeds and reaches nobody instead of failing as unknown.
    pub fn declare<E: Event>(&mut self) -> &mut Self {
        self.draft_for::<E>();
        self
    }

    /// Binds a sync handler for the pair `(E, S)`.
    ///
    /// Fails with [`DispatchError::DuplicateBinding`](crate::DispatchError::DuplicateBinding)
    /// when the pair already has a sync handler.
    pub fn bind<E, S, F, R>(&mut self, priority: Priority, handler: F) -> Result<&mut Self>
    where
        E: Event,
        S: 'static,
        F: Fn(&S, &E, &EventBus) -> R + 'static,
        R: Continuation,
    {
        let registry = self.registry_for::<E, S>(priority);
        registry.initialize_sync(
            Box::new(move |subscriber, event, bus| handler(subscriber, event, bus).proceed()),
            R::RETURNS_FLAG,
        )?;
        debug!(
            "🔗 Bound sync handler {} -> {} at {} priority",
            E::event_name(),
            std::any::type_name::<S>(),
            priority
        );
        Ok(self)
    }

    /// Binds an async handler for the pair `(E, S)`.
    ///
    /// The handler receives its own clone of the event and a handle to the
    /// bus, and is awaited by `publish_async`. Synchronous publishes skip it.
    pub fn bind_async<E, S, F, Fut, R>(&mut self, priority: Priority, handler: F) -> Result<&mut Self>
    where
        E: Event,
        S: 'static,
        F: Fn(Rc<S>, E, EventBus) -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
        R: Continuation + 'static,
    {
        let registry = self.registry_for::<E, S>(priority);
        registry.initialize_async(
            Box::new(move |subscriber, event, bus| {
                handler(subscriber, event, bus)
                    .map(Continuation::proceed)
                    .boxed_local()
            }),
            R::RETURNS_FLAG,
        )?;
        debug!(
            "🔗 Bound async handler {} -> {} at {} priority",
            E::event_name(),
            std::any::type_name::<S>(),
            priority
        );
        Ok(self)
    }

    /// Binds every handler a [`Subscriber`] declares.
    pub fn subscriber<S: Subscriber>(&mut self) -> Result<&mut Self> {
        let mut binder = SubscriberBinder {
            table: self,
            _subscriber: PhantomData,
        };
        S::bind(&mut binder)?;
        Ok(self)
    }

    /// Builds the bus with default settings.
    pub fn build(&mut self) -> Result<EventBus> {
        self.build_with(DispatchSettings::default())
    }

    /// Builds the bus, consuming the collected bindings.
    pub fn build_with(&mut self, settings: DispatchSettings) -> Result<EventBus> {
        settings.validate()?;
        let table = std::mem::take(self);

        let groups: usize = table.registries.len();
        let channels: HashMap<TypeId, Box<dyn Any>> = table
            .channels
            .into_iter()
            .map(|(event, draft)| (event, draft.finish(&settings)))
            .collect();

        info!(
            "🚀 Dispatch bus ready: {} event types, {} handler groups",
            channels.len(),
            groups
        );
        Ok(EventBus::from_parts(channels, table.routes, settings))
    }

    fn draft_for<E: Event>(&mut self) -> &mut Draft<E> {
        let draft = self
            .channels
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Draft::<E> { groups: Vec::new() }));
        match draft.as_any_mut().downcast_mut::<Draft<E>>() {
            Some(draft) => draft,
            None => unreachable!("channel drafts are keyed by their event type"),
        }
    }

    fn registry_for<E: Event, S: 'static>(&mut self, priority: Priority) -> Rc<Registry<E, S>> {
        let key = (TypeId::of::<E>(), TypeId::of::<S>());
        if let Some(existing) = self.registries.get(&key) {
            let registry = match Rc::clone(existing).downcast::<Registry<E, S>>() {
                Ok(registry) => registry,
                Err(_) => unreachable!("registries are keyed by their own type ids"),
            };
            let group_priority = registry.descriptor().priority;
            if group_priority != priority {
                warn!(
                    "⚠️ {} -> {} already bound at {} priority, ignoring {}",
                    E::event_name(),
                    std::any::type_name::<S>(),
                    group_priority,
                    priority
                );
            }
            return registry;
        }

        let order = self.next_order;
        self.next_order += 1;
        let registry = Rc::new(Registry::<E, S>::new(priority, order));
        self.registries
            .insert(key, Rc::clone(&registry) as Rc<dyn Any>);

        self.draft_for::<E>()
            .groups
            .push(Rc::clone(&registry) as Rc<dyn SubscriberGroup<E>>);

        let routes = self
            .routes
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Box::new(Vec::<Rc<dyn Route<S>>>::new()));
        if let Some(routes) = routes.downcast_mut::<Vec<Rc<dyn Route<S>>>>() {
            routes.push(Rc::clone(&registry) as Rc<dyn Route<S>>);
        }

        registry
    }
}

impl fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingTable")
            .field("event_types", &self.channels.len())
            .field("groups", &self.registries.len())
            .finish()
    }
}

/// Type-erased handle on a channel under construction.
trait ChannelDraft {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn finish(self: Box<Self>, settings: &DispatchSettings) -> Box<dyn Any>;
}

struct Draft<E> {
    groups: Vec<Rc<dyn SubscriberGroup<E>>>,
}

impl<E: Event> ChannelDraft for Draft<E> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn finish(self: Box<Self>, settings: &DispatchSettings) -> Box<dyn Any> {
        let mut groups = self.groups;
        groups.sort_by_key(|group| {
            let descriptor = group.descriptor();
            (descriptor.priority, descriptor.order)
        });
        Box::new(Channel::new(groups, settings))
    }
}
