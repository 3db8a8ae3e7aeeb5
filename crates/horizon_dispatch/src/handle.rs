//! Subscription handles.

use std::fmt;

/// Stops a subscription when disposed or dropped.
///
/// Disposal is idempotent, and disposing after the subscriber was stopped by
/// hand is a no-op. Call [`detach`](Self::detach) to keep the subscription
/// alive past the handle.
#[must_use = "dropping a SubscriptionHandle stops the subscription; call `detach` to keep it"]
pub struct SubscriptionHandle {
    stop: Option<Box<dyn FnOnce()>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(stop: impl FnOnce() + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// Runs the stop action once. Later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.stop.is_none()
    }

    /// Drops the handle without stopping the subscription. The subscriber
    /// then stays registered until stopped by hand.
    pub fn detach(mut self) {
        self.stop = None;
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
