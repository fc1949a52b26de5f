//! Execution profile identity.
//!
//! A profile is one credential/provider/model configuration. Only the
//! immutable identity lives here; runtime state (lock, cooldown, failure
//! count) belongs to the profile pool, which is the sole writer of it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque profile identifier, unique within a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One credential/provider/model configuration.
///
/// Higher `priority` profiles are tried first; ties are broken by the pool
/// in favor of fewer recent failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub id: ProfileId,
    pub provider: String,
    pub credential: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

impl ExecutionProfile {
    #[must_use]
    pub fn new(id: impl Into<ProfileId>, provider: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            credential: credential.into(),
            model: None,
            base_url: None,
            priority: 0,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl From<String> for ProfileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
