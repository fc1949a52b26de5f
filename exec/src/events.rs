//! Execution lifecycle events.
//!
//! The orchestrator has no UI or persistence responsibility; everything it
//! does is observable through these events. Consumers subscribe by passing
//! an [`EventSink`] into the executor - there is no global listener
//! registry.

use std::time::Duration;

use codebuddy_types::{ProfileId, ThinkingLevel};

use crate::classify::ErrorKind;

/// One lifecycle notification from the executor.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    AttemptStart {
        profile: ProfileId,
        attempt: u32,
        thinking: ThinkingLevel,
    },
    AttemptSuccess {
        profile: ProfileId,
        attempt: u32,
    },
    AttemptError {
        profile: ProfileId,
        attempt: u32,
        kind: ErrorKind,
        message: String,
    },
    CompactionStart {
        messages: usize,
    },
    CompactionComplete {
        messages_before: usize,
        messages_after: usize,
    },
    ThinkingFallback {
        from: ThinkingLevel,
        to: ThinkingLevel,
    },
    RetryDelay {
        profile: ProfileId,
        delay: Duration,
    },
    ProfileLocked {
        profile: ProfileId,
        cooldown: Duration,
    },
    ProfileSucceeded {
        profile: ProfileId,
    },
    ProfileAdded {
        profile: ProfileId,
    },
    ProfileRemoved {
        profile: ProfileId,
    },
    PoolUnlocked,
}

/// Observer interface for execution lifecycle events.
///
/// The default implementation ignores everything, so sinks only override
/// what they care about.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent) {
        let _ = event;
    }
}

/// Sink that drops all events. Used when the caller supplies nothing.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Sink that forwards events onto `tracing` at sensible levels.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::AttemptStart {
                profile,
                attempt,
                thinking,
            } => {
                tracing::debug!(%profile, attempt, thinking = %thinking, "attempt start");
            }
            ExecutionEvent::AttemptSuccess { profile, attempt } => {
                tracing::debug!(%profile, attempt, "attempt succeeded");
            }
            ExecutionEvent::AttemptError {
                profile,
                attempt,
                kind,
                message,
            } => {
                tracing::warn!(%profile, attempt, kind = kind.as_str(), error = %message, "attempt failed");
            }
            ExecutionEvent::CompactionStart { messages } => {
                tracing::debug!(messages, "compaction start");
            }
            ExecutionEvent::CompactionComplete {
                messages_before,
                messages_after,
            } => {
                tracing::debug!(messages_before, messages_after, "compaction complete");
            }
            ExecutionEvent::ThinkingFallback { from, to } => {
                tracing::info!(from = %from, to = %to, "thinking level fallback");
            }
            ExecutionEvent::RetryDelay { profile, delay } => {
                tracing::debug!(%profile, delay_ms = delay.as_millis(), "retry delay");
            }
            ExecutionEvent::ProfileLocked { profile, cooldown } => {
                tracing::warn!(%profile, cooldown_ms = cooldown.as_millis(), "profile locked");
            }
            ExecutionEvent::ProfileSucceeded { profile } => {
                tracing::debug!(%profile, "profile succeeded");
            }
            ExecutionEvent::ProfileAdded { profile } => {
                tracing::debug!(%profile, "profile added");
            }
            ExecutionEvent::ProfileRemoved { profile } => {
                tracing::debug!(%profile, "profile removed");
            }
            ExecutionEvent::PoolUnlocked => {
                tracing::info!("all profiles unlocked");
            }
        }
    }
}
