//! Dispatch bus - split into channel storage, fluent emission, the dispatch
//! loops, listening and statistics

mod channel;
mod core;
mod dispatch;
mod emission;
mod listening;
mod stats;

pub use self::core::EventBus;
pub use emission::Emission;
pub use stats::{DispatchStats, PoolStats};

pub(crate) use channel::Channel;
