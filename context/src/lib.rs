//! Context budget management.
//!
//! Keeps a conversation inside a model's context window: token counting,
//! usage statistics and warnings, a staged compaction ladder, and a
//! restorable compressor that trades long content for recoverable
//! identifier stubs. [`BudgetCompactor`] plugs the manager into the
//! execution orchestrator's compaction seam.

mod budget;
mod compactor;
mod restore;
mod token_counter;

pub use budget::{
    BudgetConfig, CompactionStrategy, CompressionResult, ContextBudgetManager,
    ContextStats, ConversationSummary, MemoryMetrics, QualityMetrics, usage_percent,
};
pub use compactor::BudgetCompactor;
pub use restore::{CompressOutcome, RestorableCompressor, RestoreOutcome};
pub use token_counter::{MESSAGE_OVERHEAD, TiktokenCounter, TokenCounter};
