//! Execution orchestrator for CodeBuddy.
//!
//! This crate is the failure-handling core around one unit of work (a model
//! call): an error taxonomy, a prioritized profile pool with cooldown and
//! backoff, and the retry/rotation/degradation loop that composes them.
//!
//! The actual model call, the token counter and the compaction collaborator
//! are all injected at the boundary; nothing here touches the network.

mod classify;
mod events;
mod orchestrator;
mod pool;

pub use classify::{ClassifiedError, ErrorKind, WorkError, classify};
pub use events::{EventSink, ExecutionEvent, LoggingSink, NullSink};
pub use orchestrator::{
    CompactionOutcome, Compactor, ExecuteOptions, ExecutionAttempt, ExecutionResult, Executor,
    ExecutorConfig, retry_delay,
};
pub use pool::{PoolConfig, PoolError, ProfilePool, ProfileStatus, backoff_delay};
