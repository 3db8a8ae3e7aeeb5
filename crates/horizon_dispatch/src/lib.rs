//! # Horizon Dispatch
//!
//! A strongly-typed, in-process publish/subscribe engine. Events are plain
//! values; subscribers are ordinary `Rc`-owned objects whose methods are bound
//! as handlers once at startup.
//!
//! ## Core Features
//!
//! - **Deterministic order**: handler groups run by [`Priority`], then by the
//!   order they were bound; instances run in registration order
//! - **Cancelation**: a cancelable publish stops at the first handler that
//!   returns `false`
//! - **Per-publish filters**: exclude or restrict by instance, set, concrete
//!   type, or any predicate; filters combine with OR semantics
//! - **Reentrancy**: handlers may publish, subscribe and unsubscribe during a
//!   dispatch; nested publishes never see the outer publish's settings
//! - **No steady-state allocation**: publish configs are recycled through a
//!   bounded per-event pool
//! - **Async handlers**: awaited one at a time in the same order as sync ones
//!
//! ## Quick Start Example
//!
//! ```rust
//! use horizon_dispatch::{define_event, BindingTable, EventBus, Priority};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! define_event! {
//!     Damage { amount: u32 }
//! }
//!
//! #[derive(Default)]
//! struct Health {
//!     lost: Cell<u32>,
//! }
//!
//! struct Shield;
//!
//! let bus = BindingTable::new()
//!     .bind(Priority::High, |_: &Shield, event: &Damage, _: &EventBus| event.amount < 10)?
//!     .bind(Priority::Medium, |health: &Health, event: &Damage, _: &EventBus| {
//!         health.lost.set(health.lost.get() + event.amount);
//!     })?
//!     .build()?;
//!
//! let shield = Rc::new(Shield);
//! let health = Rc::new(Health::default());
//! let _shield = bus.start_listening(&shield);
//! let _health = bus.start_listening(&health);
//!
//! // the shield absorbs big hits when the publish is cancelable
//! assert!(!bus.emit(Damage { amount: 25 }).cancelable().publish()?);
//! assert!(bus.emit(Damage { amount: 5 }).cancelable().publish()?);
//! assert_eq!(health.lost.get(), 5);
//! # Ok::<(), horizon_dispatch::DispatchError>(())
//! ```
//!
//! The bus is single-threaded (`!Send`). Async publishes run on whatever
//! local executor the application drives.

pub mod binding;
pub mod bus;
pub mod error;
pub mod event;
pub mod filter;
pub mod handle;
pub mod macros;
pub mod priority;
pub mod publish;
mod registry;
pub mod settings;

pub use binding::{
    BindingInfo, BindingTable, Continuation, HandlerInfo, HandlerKind, Subscriber,
    SubscriberBinder,
};
pub use bus::{DispatchStats, Emission, EventBus, PoolStats};
pub use error::{DispatchError, Result};
pub use event::Event;
pub use filter::{AsSubscriberId, Filter, SubscriberId, SubscriberSet, SubscriberView};
pub use handle::SubscriptionHandle;
pub use priority::Priority;
pub use publish::PublishConfig;
pub use settings::DispatchSettings;

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
