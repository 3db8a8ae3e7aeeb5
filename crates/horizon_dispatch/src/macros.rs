//! Convenience macros for declaring event types.

/// Implements [`Event`](crate::Event) for existing types using the default
/// type-name based diagnostics.
///
/// ```
/// use horizon_dispatch::impl_event;
///
/// #[derive(Debug, Clone)]
/// struct Heartbeat;
///
/// #[derive(Debug, Clone)]
/// struct Resized(u32, u32);
///
/// impl_event!(Heartbeat, Resized);
/// ```
#[macro_export]
macro_rules! impl_event {
    ($($event:ty),+ $(,)?) => {
        $(
            impl $crate::Event for $event {}
        )+
    };
}

/// Declares a public event struct with public fields and implements
/// [`Event`](crate::Event) for it, using the bare struct name in diagnostics.
///
/// ```
/// use horizon_dispatch::{define_event, Event};
///
/// define_event! {
///     /// Raised when a unit takes damage.
///     DamageTaken {
///         amount: u32,
///         source: String,
///     }
/// }
///
/// assert_eq!(DamageTaken::event_name(), "DamageTaken");
/// ```
#[macro_export]
macro_rules! define_event {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $crate::Event for $name {
            fn event_name() -> &'static str {
                stringify!($name)
            }
        }
    };
}
