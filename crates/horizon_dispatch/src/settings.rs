//! Tunables for a dispatch bus.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};

/// Bus-wide settings, applied to every event type's config pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Upper bound on cleared publish configs kept per event type.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    /// Configs created up front per event type, capped by `pool_capacity`.
    #[serde(default)]
    pub preallocate: usize,
    /// Log a warning when a type with no bindings starts listening.
    #[serde(default = "default_warn_on_unbound_subscriber")]
    pub warn_on_unbound_subscriber: bool,
}

fn default_pool_capacity() -> usize {
    16
}

fn default_warn_on_unbound_subscriber() -> bool {
    true
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            pool_capacity: default_pool_capacity(),
            preallocate: 0,
            warn_on_unbound_subscriber: default_warn_on_unbound_subscriber(),
        }
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(DispatchError::InvalidSettings(
                "pool_capacity must be greater than 0".to_string(),
            ));
        }
        if self.preallocate > self.pool_capacity {
            return Err(DispatchError::InvalidSettings(format!(
                "preallocate ({}) cannot exceed pool_capacity ({})",
                self.preallocate, self.pool_capacity
            )));
        }
        Ok(())
    }
}
