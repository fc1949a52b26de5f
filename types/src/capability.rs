//! Thinking-level capability ladder.
//!
//! Providers differ in which reasoning depths they accept. When a provider
//! rejects the requested level, the orchestrator walks down this ladder and
//! retries at the next lower level instead of failing the attempt outright.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reasoning depth requested from the model.
///
/// Ordered from most to least capable. `Off` disables extended reasoning
/// entirely and is accepted by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    High,
    Medium,
    Low,
    Off,
}

impl ThinkingLevel {
    /// The default descending ladder tried during capability fallback.
    pub const LADDER: [Self; 4] = [Self::High, Self::Medium, Self::Low, Self::Off];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Off => "off",
        }
    }

    /// The next lower level, or `None` when the ladder is exhausted.
    #[must_use]
    pub fn downgrade(self) -> Option<Self> {
        match self {
            Self::High => Some(Self::Medium),
            Self::Medium => Some(Self::Low),
            Self::Low => Some(Self::Off),
            Self::Off => None,
        }
    }
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
