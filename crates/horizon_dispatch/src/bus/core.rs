//! Core EventBus implementation

use super::channel::Channel;
use super::stats::{DispatchCounters, DispatchStats, PoolStats};
use crate::binding::{BindingInfo, BindingTable};
use crate::error::{DispatchError, Result};
use crate::event::Event;
use crate::registry::Route;
use crate::settings::DispatchSettings;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

/// The dispatch bus built from a [`BindingTable`].
///
/// Holds one channel per event type (handler groups in dispatch order, the
/// staging slot and the config pool) and, per subscriber type, the routes
/// used to start and stop listening. The set of channels and groups is fixed
/// once built; only the live instances inside each group change.
///
/// The bus is single-threaded and cheap to clone. Handlers receive a
/// reference to it so they can publish from inside a dispatch.
#[derive(Clone)]
pub struct EventBus {
    pub(super) inner: Rc<BusInner>,
}

pub(super) struct BusInner {
    /// Event `TypeId` -> `Channel<E>`
    channels: HashMap<TypeId, Box<dyn Any>>,
    /// Subscriber `TypeId` -> `Vec<Rc<dyn Route<S>>>`
    routes: HashMap<TypeId, Box<dyn Any>>,
    pub(super) settings: DispatchSettings,
    pub(super) counters: DispatchCounters,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.inner.channels.len())
            .field("subscriber_types", &self.inner.routes.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl EventBus {
    pub(crate) fn from_parts(
        channels: HashMap<TypeId, Box<dyn Any>>,
        routes: HashMap<TypeId, Box<dyn Any>>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            inner: Rc::new(BusInner {
                channels,
                routes,
                settings,
                counters: DispatchCounters::default(),
            }),
        }
    }

    /// Starts a new binding table.
    pub fn builder() -> BindingTable {
        BindingTable::new()
    }

    pub(crate) fn counters(&self) -> &DispatchCounters {
        &self.inner.counters
    }

    pub(super) fn channel<E: Event>(&self) -> Result<&Channel<E>> {
        self.inner
            .channels
            .get(&TypeId::of::<E>())
            .and_then(|channel| channel.downcast_ref::<Channel<E>>())
            .ok_or(DispatchError::UnknownEventType(E::event_name()))
    }

    pub(super) fn routes<S: 'static>(&self) -> &[Rc<dyn Route<S>>] {
        self.inner
            .routes
            .get(&TypeId::of::<S>())
            .and_then(|routes| routes.downcast_ref::<Vec<Rc<dyn Route<S>>>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.inner.settings
    }

    /// True when `E` was declared or has at least one handler.
    pub fn is_declared<E: Event>(&self) -> bool {
        self.inner.channels.contains_key(&TypeId::of::<E>())
    }

    /// Handler groups for `E` in dispatch order.
    pub fn bindings<E: Event>(&self) -> Result<Vec<BindingInfo>> {
        Ok(self
            .channel::<E>()?
            .groups()
            .iter()
            .map(|group| group.binding_info())
            .collect())
    }

    /// Live subscribers across every group of `E`.
    pub fn subscriber_count<E: Event>(&self) -> Result<usize> {
        Ok(self
            .channel::<E>()?
            .groups()
            .iter()
            .map(|group| group.live_count())
            .sum())
    }

    pub fn pool_stats<E: Event>(&self) -> Result<PoolStats> {
        Ok(self.channel::<E>()?.slots().pool_stats())
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.counters.snapshot()
    }
}
