//! Bridge between the budget manager and the execution orchestrator.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use codebuddy_exec::{CompactionOutcome, Compactor};
use codebuddy_types::Message;

use crate::budget::ContextBudgetManager;

/// Adapts a [`ContextBudgetManager`] to the orchestrator's compaction
/// collaborator seam.
///
/// The manager is interior-mutable so one compactor can be shared by
/// reference across execute calls; compression is synchronous, so the
/// lock is never held across an await.
pub struct BudgetCompactor {
    inner: Mutex<ContextBudgetManager>,
}

impl BudgetCompactor {
    #[must_use]
    pub fn new(manager: ContextBudgetManager) -> Self {
        Self {
            inner: Mutex::new(manager),
        }
    }

    /// Hand the manager back, consuming the adapter.
    pub fn into_inner(self) -> ContextBudgetManager {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Compactor for BudgetCompactor {
    async fn compact(&self, messages: &[Message]) -> anyhow::Result<CompactionOutcome> {
        let result = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .compress(messages.to_vec());
        Ok(CompactionOutcome {
            success: result.compacted,
            messages: result.messages,
        })
    }
}
