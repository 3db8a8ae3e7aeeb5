//! Per event type storage inside the bus

use crate::event::Event;
use crate::publish::ConfigSlots;
use crate::registry::SubscriberGroup;
use crate::settings::DispatchSettings;
use std::rc::Rc;

/// Everything the bus keeps for one event type: handler groups in dispatch
/// order plus the staging slot and config pool.
pub(crate) struct Channel<E> {
    groups: Vec<Rc<dyn SubscriberGroup<E>>>,
    slots: ConfigSlots<E>,
}

impl<E: Event> Channel<E> {
    /// `groups` must already be sorted by priority and binding order.
    pub(crate) fn new(groups: Vec<Rc<dyn SubscriberGroup<E>>>, settings: &DispatchSettings) -> Self {
        Self {
            groups,
            slots: ConfigSlots::new(settings.pool_capacity, settings.preallocate),
        }
    }

    pub(crate) fn groups(&self) -> &[Rc<dyn SubscriberGroup<E>>] {
        &self.groups
    }

    pub(crate) fn slots(&self) -> &ConfigSlots<E> {
        &self.slots
    }
}
