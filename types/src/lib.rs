//! Core domain types for CodeBuddy.
//!
//! This crate holds the types shared between the execution orchestrator and
//! the context budget manager. It deliberately has no IO and no async: every
//! type here is plain data that either side can pass across the seam.

mod capability;
mod message;
mod profile;

pub use capability::ThinkingLevel;
pub use message::{Message, Role};
pub use profile::{ExecutionProfile, ProfileId};
