//! The event trait.

use std::fmt::Debug;

/// A value that can be published through an [`EventBus`](crate::EventBus).
///
/// Events are plain values. Sync handlers borrow the published value and
/// async handlers receive their own clone, so the publisher's copy is never
/// mutated by dispatch. Channel identity is the event's `TypeId`; the name
/// only shows up in logs and errors.
pub trait Event: Clone + Debug + 'static {
    /// Human readable name used in diagnostics.
    fn event_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}
