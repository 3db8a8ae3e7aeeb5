//! Dispatch loops

use super::channel::Channel;
use super::core::EventBus;
use crate::event::Event;
use crate::publish::ConfigLease;
use tracing::trace;

impl EventBus {
    /// Runs every group of the channel in order against a freshly detached
    /// config. Stops at the first group a cancelable publish was stopped in.
    pub(super) fn dispatch<E: Event>(&self, channel: &Channel<E>, event: &E) -> bool {
        let config = channel.slots().detach_for_publish();
        self.counters().record_publish();
        trace!(
            "📤 Publishing {} to {} groups (cancelable: {}, filters: {})",
            E::event_name(),
            channel.groups().len(),
            config.is_cancelable(),
            config.filters().len()
        );

        for group in channel.groups() {
            if !group.invoke(self, event, &config) {
                self.counters().record_cancel();
                trace!(
                    "🛑 {} canceled by {}",
                    E::event_name(),
                    group.descriptor().subscriber
                );
                return false;
            }
        }
        true
    }

    /// Async counterpart of [`dispatch`](Self::dispatch). Groups with an
    /// async handler are awaited subscriber by subscriber; groups with only a
    /// sync handler are called directly.
    pub(super) async fn dispatch_async<E: Event>(
        &self,
        channel: &Channel<E>,
        event: E,
        config: ConfigLease<'_, E>,
    ) -> bool {
        self.counters().record_async_publish();
        trace!(
            "📤 Publishing {} asynchronously to {} groups",
            E::event_name(),
            channel.groups().len()
        );

        for group in channel.groups() {
            let completed = match group.invoke_async(self, &event, &config) {
                Some(pass) => pass.await,
                None => group.invoke(self, &event, &config),
            };
            if !completed {
                self.counters().record_cancel();
                trace!(
                    "🛑 {} canceled by {}",
                    E::event_name(),
                    group.descriptor().subscriber
                );
                return false;
            }
        }
        true
    }
}
