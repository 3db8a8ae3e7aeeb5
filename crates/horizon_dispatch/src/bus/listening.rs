//! Starting and stopping subscriptions

use super::core::EventBus;
use crate::error::{DispatchError, Result};
use crate::event::Event;
use crate::filter::SubscriberId;
use crate::handle::SubscriptionHandle;
use crate::registry::Route;
use std::any::TypeId;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

impl EventBus {
    /// Registers the subscriber with every event type its type is bound to.
    ///
    /// The bus only keeps a weak reference; the caller stays the owner.
    /// Registering an instance twice is a no-op. The returned handle stops
    /// every one of these subscriptions when disposed or dropped.
    pub fn start_listening<S: 'static>(&self, subscriber: &Rc<S>) -> SubscriptionHandle {
        let routes = self.routes::<S>();
        if routes.is_empty() {
            if self.inner.settings.warn_on_unbound_subscriber {
                warn!(
                    "⚠️ {} started listening but has no bound handlers",
                    std::any::type_name::<S>()
                );
            }
        } else {
            for route in routes {
                route.attach(subscriber);
            }
            debug!(
                "👂 {} listening to {} event types",
                std::any::type_name::<S>(),
                routes.len()
            );
        }

        let bus = self.clone();
        let target = Rc::downgrade(subscriber);
        SubscriptionHandle::new(move || bus.detach_everywhere(&target))
    }

    /// Registers the subscriber for `E` only.
    pub fn start_listening_to<E: Event, S: 'static>(
        &self,
        subscriber: &Rc<S>,
    ) -> Result<SubscriptionHandle> {
        let route = self.route_for::<E, S>()?;
        route.attach(subscriber);
        debug!(
            "👂 {} listening to {}",
            std::any::type_name::<S>(),
            route.event_name()
        );

        let route = Rc::clone(route);
        let target = Rc::downgrade(subscriber);
        Ok(SubscriptionHandle::new(move || {
            route.detach(SubscriberId::of_weak(&target));
        }))
    }

    /// Unregisters the subscriber from every event type. Safe to repeat.
    pub fn stop_listening<S: 'static>(&self, subscriber: &Rc<S>) {
        self.detach_everywhere(&Rc::downgrade(subscriber));
    }

    /// Unregisters the subscriber from `E` only. Safe to repeat.
    pub fn stop_listening_to<E: Event, S: 'static>(&self, subscriber: &Rc<S>) -> Result<()> {
        self.route_for::<E, S>()?.detach(SubscriberId::of(subscriber));
        Ok(())
    }

    /// True when the instance is currently registered for `E`.
    pub fn is_listening<E: Event, S: 'static>(&self, subscriber: &Rc<S>) -> bool {
        self.route_for::<E, S>()
            .map(|route| route.is_attached(SubscriberId::of(subscriber)))
            .unwrap_or(false)
    }

    // The weak reference pins the allocation, so its address is not reused
    // while a handle still holds it.
    fn detach_everywhere<S: 'static>(&self, target: &Weak<S>) {
        let id = SubscriberId::of_weak(target);
        for route in self.routes::<S>() {
            route.detach(id);
        }
    }

    fn route_for<E: Event, S: 'static>(&self) -> Result<&Rc<dyn Route<S>>> {
        self.channel::<E>()?;
        self.routes::<S>()
            .iter()
            .find(|route| route.event_type() == TypeId::of::<E>())
            .ok_or(DispatchError::UnboundSubscriber {
                event: E::event_name(),
                subscriber: std::any::type_name::<S>(),
            })
    }
}
