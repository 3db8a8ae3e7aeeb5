//! Error types for the dispatch core

use crate::binding::HandlerKind;

/// Main error type for the dispatch core.
///
/// Panics raised by handlers are not represented here. They unwind through
/// `publish` untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// A filter argument was missing, dead or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No channel was declared or bound for the event type
    #[error("Unknown event type: {0}")]
    UnknownEventType(&'static str),

    /// The binding step supplied a second handler of the same kind for one pair
    #[error("Duplicate {kind} binding for event {event} on subscriber {subscriber}")]
    DuplicateBinding {
        event: &'static str,
        subscriber: &'static str,
        kind: HandlerKind,
    },

    /// The subscriber type has no handler for the event type
    #[error("Subscriber {subscriber} has no binding for event {event}")]
    UnboundSubscriber {
        event: &'static str,
        subscriber: &'static str,
    },

    /// Dispatch settings failed validation
    #[error("Invalid dispatch settings: {0}")]
    InvalidSettings(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, DispatchError>;
