//! Fluent per-publish configuration

use super::channel::Channel;
use super::core::EventBus;
use crate::error::{DispatchError, Result};
use crate::event::Event;
use crate::filter::{AsSubscriberId, Filter, SubscriberSet, SubscriberView};
use crate::publish::{ConfigSlots, PublishConfig};
use std::any::Any;
use std::future::Future;

/// An event on its way out, collecting settings for this one publish.
///
/// Every setting is written into the event type's staging config, which
/// `publish` detaches just before dispatch. The event value itself is carried
/// along untouched. Dropping an emission without publishing discards the
/// staged settings.
///
/// There is one staging slot per event type, not one per emission. Two
/// emissions of the same event type alive at once write into the same
/// config, and dropping either unpublished clears what both staged. Build
/// and publish one emission at a time.
///
/// ```
/// use horizon_dispatch::{BindingTable, EventBus, Priority};
/// use std::rc::Rc;
///
/// #[derive(Debug, Clone)]
/// struct Alert;
/// horizon_dispatch::impl_event!(Alert);
///
/// struct Pager;
///
/// let bus = BindingTable::new()
///     .bind(Priority::Medium, |_: &Pager, _: &Alert, _: &EventBus| false)?
///     .build()?;
/// let first = Rc::new(Pager);
/// let second = Rc::new(Pager);
/// let _a = bus.start_listening(&first);
/// let _b = bus.start_listening(&second);
///
/// let completed = bus
///     .emit(Alert)
///     .cancelable()
///     .exclude_instance(&first)?
///     .publish()?;
/// assert!(!completed);
/// # Ok::<(), horizon_dispatch::DispatchError>(())
/// ```
#[must_use = "an emission does nothing until `publish` or `publish_async` is called"]
pub struct Emission<'a, E: Event> {
    bus: &'a EventBus,
    channel: Option<&'a Channel<E>>,
    event: E,
    staged: StagedSettings<'a, E>,
}

/// Clears the staging slot unless the emission was published.
struct StagedSettings<'a, E> {
    slots: Option<&'a ConfigSlots<E>>,
}

impl<E> StagedSettings<'_, E> {
    fn apply(&self, setting: impl FnOnce(&mut PublishConfig<E>)) {
        if let Some(slots) = self.slots {
            slots.stage(setting);
        }
    }

    fn disarm(mut self) {
        self.slots = None;
    }
}

impl<E> Drop for StagedSettings<'_, E> {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.take() {
            slots.discard_staged();
        }
    }
}

impl<'a, E: Event> Emission<'a, E> {
    pub(super) fn new(bus: &'a EventBus, event: E) -> Self {
        let channel = bus.channel::<E>().ok();
        Self {
            bus,
            channel,
            event,
            staged: StagedSettings {
                slots: channel.map(Channel::slots),
            },
        }
    }

    /// Lets handlers that return `false` stop the publish.
    pub fn cancelable(self) -> Self {
        self.staged.apply(PublishConfig::set_cancelable);
        self
    }

    /// Adds a filter; subscribers matching any filter are skipped.
    pub fn with_filter(self, filter: Filter) -> Self {
        self.staged.apply(|config| config.add_filter(filter));
        self
    }

    /// Skips subscribers for which `predicate` returns true.
    pub fn with_predicate(self, predicate: impl Fn(&SubscriberView<'_>) -> bool + 'static) -> Self {
        self.with_filter(Filter::custom(predicate))
    }

    pub fn exclude_instance(self, target: impl AsSubscriberId) -> Result<Self> {
        let filter = Filter::exclude_instance(target)?;
        Ok(self.with_filter(filter))
    }

    pub fn include_only_instance(self, target: impl AsSubscriberId) -> Result<Self> {
        let filter = Filter::include_only_instance(target)?;
        Ok(self.with_filter(filter))
    }

    pub fn exclude_set(self, set: &SubscriberSet) -> Result<Self> {
        let filter = Filter::exclude_set(set)?;
        Ok(self.with_filter(filter))
    }

    pub fn include_only_set(self, set: &SubscriberSet) -> Result<Self> {
        let filter = Filter::include_only_set(set)?;
        Ok(self.with_filter(filter))
    }

    /// Delivers only to subscribers whose concrete type is `T`.
    pub fn only_type<T: Any>(self) -> Self {
        self.with_filter(Filter::include_only_type::<T>())
    }

    /// Skips subscribers whose concrete type is `T`.
    pub fn exclude_type<T: Any>(self) -> Self {
        self.with_filter(Filter::exclude_type::<T>())
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    /// Dispatches synchronously. Returns `Ok(false)` when a cancelable
    /// publish was stopped by a handler.
    pub fn publish(self) -> Result<bool> {
        let Emission {
            bus,
            channel,
            event,
            staged,
        } = self;
        staged.disarm();
        let channel = channel.ok_or(DispatchError::UnknownEventType(E::event_name()))?;
        Ok(bus.dispatch(channel, &event))
    }

    /// Dispatches asynchronously, awaiting async handlers one at a time.
    ///
    /// The staged settings are detached when this is called, not when the
    /// future is first polled, so further emissions can be configured before
    /// awaiting it.
    pub fn publish_async(self) -> impl Future<Output = Result<bool>> + 'a {
        let Emission {
            bus,
            channel,
            event,
            staged,
        } = self;
        staged.disarm();
        let prepared = channel
            .map(|channel| (channel, channel.slots().detach_for_publish()))
            .ok_or(DispatchError::UnknownEventType(E::event_name()));
        async move {
            let (channel, config) = prepared?;
            Ok(bus.dispatch_async(channel, event, config).await)
        }
    }
}

impl<E: Event> std::fmt::Debug for Emission<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emission")
            .field("event", &self.event)
            .field("declared", &self.channel.is_some())
            .finish()
    }
}

impl EventBus {
    /// Starts a fluent publish of `event`.
    pub fn emit<E: Event>(&self, event: E) -> Emission<'_, E> {
        Emission::new(self, event)
    }

    /// Publishes `event` with whatever settings are currently staged.
    pub fn publish<E: Event>(&self, event: E) -> Result<bool> {
        self.emit(event).publish()
    }

    /// Async counterpart of [`publish`](Self::publish).
    pub fn publish_async<E: Event>(&self, event: E) -> impl Future<Output = Result<bool>> + '_ {
        self.emit(event).publish_async()
    }
}
