//! Handler priority levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative ordering of handler groups for one event type.
///
/// Groups run in ascending rank: `Primary` first, `End` last. Groups that
/// share a priority run in binding order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Primary,
    High,
    #[default]
    Medium,
    Low,
    End,
}

impl Priority {
    /// Every level, in dispatch order.
    pub const ALL: [Priority; 5] = [
        Priority::Primary,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::End,
    ];

    /// Numeric rank, lower runs first.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Primary => "primary",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::End => "end",
        };
        f.write_str(name)
    }
}
