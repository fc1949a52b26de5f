//! Execution orchestrator.
//!
//! Drives one unit of work (a model call) against the profile pool:
//! classify each failure, then retry in place, rotate to another profile,
//! degrade the thinking level, or ask the injected compaction collaborator
//! to shrink the conversation. Only two outcomes ever reach the caller -
//! overall success with the winning attempt's value, or overall failure
//! with a reason and the complete attempt log. No error escapes
//! [`Executor::execute`].
//!
//! Attempts run strictly sequentially; the first success short-circuits the
//! whole search. Compaction retries and thinking-level fallbacks are
//! deliberately "free": they repeat the attempt without consuming retry
//! budget.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use codebuddy_types::{ExecutionProfile, Message, ProfileId, ThinkingLevel};

use crate::classify::{ClassifiedError, ErrorKind, WorkError, classify};
use crate::events::{EventSink, ExecutionEvent, NullSink};
use crate::pool::{PoolConfig, PoolError, ProfilePool, ProfileStatus};

const NO_PROFILES: &str = "No available auth profiles";
const ALL_EXHAUSTED: &str = "All profiles exhausted";
const CANCELLED: &str = "Execution cancelled";

/// Retry and fallback tuning for [`Executor::execute`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retry budget per profile. Free retries (compaction, thinking
    /// fallback) do not count against it.
    pub max_retries: u32,
    /// Base delay for the in-place retry backoff.
    pub base_delay: Duration,
    /// Cap applied to the in-place retry backoff, after jitter.
    pub max_delay: Duration,
    /// Descending thinking ladder walked on `ThinkingLevel` failures.
    pub ladder: Vec<ThinkingLevel>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ladder: ThinkingLevel::LADDER.to_vec(),
        }
    }
}

/// Jittered exponential retry delay:
/// `min(max_delay, base_delay * 2^(retry_count - 1) * (1 + jitter))` with
/// jitter drawn uniformly from `[0, 0.3)`.
#[must_use]
pub fn retry_delay(config: &ExecutorConfig, retry_count: u32) -> Duration {
    let step = retry_count.saturating_sub(1).min(31);
    let base = config.base_delay.as_secs_f64() * 2.0_f64.powi(step as i32);
    let jitter = 1.0 + rand::random::<f64>() * 0.3;
    Duration::from_secs_f64(base * jitter).min(config.max_delay)
}

/// One row of the attempt log. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct ExecutionAttempt {
    pub profile: ProfileId,
    /// Ordinal within this profile, counting free retries.
    pub attempt: u32,
    pub thinking: ThinkingLevel,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub success: bool,
    pub error: Option<ClassifiedError>,
}

/// Terminal outcome of an [`Executor::execute`] call.
#[derive(Debug)]
pub struct ExecutionResult<T> {
    pub success: bool,
    pub value: Option<T>,
    /// Every attempt, in the exact order it was executed.
    pub attempts: Vec<ExecutionAttempt>,
    /// The profile that ultimately succeeded, if any.
    pub profile: Option<ProfileId>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl<T> ExecutionResult<T> {
    fn succeeded(
        value: T,
        attempts: Vec<ExecutionAttempt>,
        profile: ProfileId,
        duration: Duration,
    ) -> Self {
        Self {
            success: true,
            value: Some(value),
            attempts,
            profile: Some(profile),
            duration,
            error: None,
        }
    }

    fn failed(reason: &str, attempts: Vec<ExecutionAttempt>, duration: Duration) -> Self {
        Self {
            success: false,
            value: None,
            attempts,
            profile: None,
            duration,
            error: Some(reason.to_string()),
        }
    }
}

/// Result of a compaction collaborator call.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub success: bool,
    pub messages: Vec<Message>,
}

/// Injected compaction collaborator.
///
/// Optional: without one, context-overflow errors follow the generic
/// retryable path. A failed compaction (`success: false` or an error) is
/// never fatal either - the orchestrator falls through to that same path.
#[async_trait]
pub trait Compactor: Send + Sync {
    async fn compact(&self, messages: &[Message]) -> anyhow::Result<CompactionOutcome>;
}

/// Per-call inputs to [`Executor::execute`].
#[derive(Default)]
pub struct ExecuteOptions<'a> {
    /// Working message history, passed to the unit of work on every attempt
    /// and replaced in place when compaction succeeds.
    pub messages: Vec<Message>,
    pub compactor: Option<&'a dyn Compactor>,
}

/// Composes the error classifier, the profile pool and an injected
/// compaction collaborator into the retry/fallback loop.
pub struct Executor {
    pool: ProfilePool,
    config: ExecutorConfig,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Executor {
    #[must_use]
    pub fn new(profiles: Vec<ExecutionProfile>, config: ExecutorConfig, pool_config: PoolConfig) -> Self {
        Self {
            pool: ProfilePool::new(profiles, pool_config),
            config,
            sink: Arc::new(NullSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the event sink. Consumers subscribe here; there is no global
    /// listener registry.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Token that cancels the in-flight unit of work and any pending retry
    /// delay. Cancellation surfaces as a terminal failure result.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn add_profile(&mut self, profile: ExecutionProfile) -> Result<(), PoolError> {
        let id = profile.id.clone();
        self.pool.add_profile(profile)?;
        self.sink.on_event(&ExecutionEvent::ProfileAdded { profile: id });
        Ok(())
    }

    pub fn remove_profile(&mut self, id: &ProfileId) -> Result<ExecutionProfile, PoolError> {
        let removed = self.pool.remove_profile(id)?;
        self.sink
            .on_event(&ExecutionEvent::ProfileRemoved { profile: id.clone() });
        Ok(removed)
    }

    pub fn unlock_all(&mut self) {
        self.pool.unlock_all();
        self.sink.on_event(&ExecutionEvent::PoolUnlocked);
    }

    #[must_use]
    pub fn profile_status(&self) -> Vec<ProfileStatus> {
        self.pool.status(Instant::now())
    }

    /// Execute one unit of work against the pool.
    ///
    /// Iterates available profiles in pool order; per profile, up to
    /// `max_retries` budgeted attempts. The first success terminates the
    /// search immediately and marks the profile. Rotation-worthy failures
    /// lock the profile (rate-limit cooldown or exponential backoff) and
    /// move on; non-retryable failures move on without locking.
    pub async fn execute<T, F, Fut>(
        &mut self,
        mut unit: F,
        options: ExecuteOptions<'_>,
    ) -> ExecutionResult<T>
    where
        F: FnMut(&ExecutionProfile, ThinkingLevel, &[Message]) -> Fut,
        Fut: Future<Output = Result<T, WorkError>>,
    {
        let started = Instant::now();
        let mut attempts: Vec<ExecutionAttempt> = Vec::new();
        let mut messages = options.messages;

        let available = self.pool.available(Instant::now());
        if available.is_empty() {
            return ExecutionResult::failed(NO_PROFILES, attempts, started.elapsed());
        }

        // Ladder cursor is shared across retries and profiles within this
        // call, and reset on the next call.
        let ladder: &[ThinkingLevel] = if self.config.ladder.is_empty() {
            &[ThinkingLevel::Off]
        } else {
            &self.config.ladder
        };
        let mut cursor = 0usize;

        'profiles: for profile in available {
            let mut retry_count: u32 = 0;
            let mut attempt_no: u32 = 0;

            loop {
                attempt_no += 1;
                let thinking = ladder[cursor];
                self.sink.on_event(&ExecutionEvent::AttemptStart {
                    profile: profile.id.clone(),
                    attempt: attempt_no,
                    thinking,
                });

                let attempt_started = SystemTime::now();
                let outcome = tokio::select! {
                    () = self.cancel.cancelled() => {
                        return ExecutionResult::failed(CANCELLED, attempts, started.elapsed());
                    }
                    outcome = unit(&profile, thinking, &messages) => outcome,
                };
                let attempt_finished = SystemTime::now();

                match outcome {
                    Ok(value) => {
                        attempts.push(ExecutionAttempt {
                            profile: profile.id.clone(),
                            attempt: attempt_no,
                            thinking,
                            started_at: attempt_started,
                            finished_at: attempt_finished,
                            success: true,
                            error: None,
                        });
                        // Pool state only changes here and in the lock path
                        // below; no external writer exists.
                        let _ = self.pool.mark_success(&profile.id, Instant::now());
                        self.sink.on_event(&ExecutionEvent::AttemptSuccess {
                            profile: profile.id.clone(),
                            attempt: attempt_no,
                        });
                        self.sink.on_event(&ExecutionEvent::ProfileSucceeded {
                            profile: profile.id.clone(),
                        });
                        return ExecutionResult::succeeded(
                            value,
                            attempts,
                            profile.id.clone(),
                            started.elapsed(),
                        );
                    }
                    Err(error) => {
                        let classified = classify(&error);
                        attempts.push(ExecutionAttempt {
                            profile: profile.id.clone(),
                            attempt: attempt_no,
                            thinking,
                            started_at: attempt_started,
                            finished_at: attempt_finished,
                            success: false,
                            error: Some(classified.clone()),
                        });
                        self.sink.on_event(&ExecutionEvent::AttemptError {
                            profile: profile.id.clone(),
                            attempt: attempt_no,
                            kind: classified.kind,
                            message: classified.message.clone(),
                        });

                        // Compaction retries are free: a successful shrink
                        // repeats the attempt without touching the retry
                        // budget. The free retry requires actual progress;
                        // a compaction that reports success but hands back
                        // the same history would loop forever here. Failed
                        // or stalled compaction is not fatal - fall through
                        // to the generic handling below.
                        if classified.requires_compaction
                            && !messages.is_empty()
                            && let Some(compactor) = options.compactor
                        {
                            self.sink.on_event(&ExecutionEvent::CompactionStart {
                                messages: messages.len(),
                            });
                            match compactor.compact(&messages).await {
                                Ok(outcome) if outcome.success && outcome.messages != messages => {
                                    self.sink.on_event(&ExecutionEvent::CompactionComplete {
                                        messages_before: messages.len(),
                                        messages_after: outcome.messages.len(),
                                    });
                                    messages = outcome.messages;
                                    continue;
                                }
                                Ok(outcome) if outcome.success => {
                                    tracing::debug!(profile = %profile.id, "compaction made no progress");
                                }
                                Ok(_) => {
                                    tracing::debug!(profile = %profile.id, "compaction declined");
                                }
                                Err(err) => {
                                    tracing::warn!(profile = %profile.id, error = %err, "compaction failed");
                                }
                            }
                        }

                        // Thinking-level fallback is also free.
                        if classified.kind == ErrorKind::ThinkingLevel && cursor + 1 < ladder.len() {
                            let from = ladder[cursor];
                            cursor += 1;
                            self.sink.on_event(&ExecutionEvent::ThinkingFallback {
                                from,
                                to: ladder[cursor],
                            });
                            continue;
                        }

                        if classified.requires_rotation {
                            let is_rate_limit = classified.kind == ErrorKind::RateLimit;
                            if let Ok(cooldown) =
                                self.pool.lock(&profile.id, is_rate_limit, Instant::now())
                            {
                                self.sink.on_event(&ExecutionEvent::ProfileLocked {
                                    profile: profile.id.clone(),
                                    cooldown,
                                });
                            }
                            continue 'profiles;
                        }

                        if classified.retryable {
                            retry_count += 1;
                            if retry_count >= self.config.max_retries {
                                continue 'profiles;
                            }
                            let delay = retry_delay(&self.config, retry_count);
                            self.sink.on_event(&ExecutionEvent::RetryDelay {
                                profile: profile.id.clone(),
                                delay,
                            });
                            tracing::debug!(
                                profile = %profile.id,
                                retry_count,
                                delay_ms = delay.as_millis(),
                                "retrying after transient failure"
                            );
                            tokio::select! {
                                () = self.cancel.cancelled() => {
                                    return ExecutionResult::failed(
                                        CANCELLED,
                                        attempts,
                                        started.elapsed(),
                                    );
                                }
                                () = sleep(delay) => {}
                            }
                            continue;
                        }

                        // Terminal for this profile, but no lock: the next
                        // profile may still succeed.
                        continue 'profiles;
                    }
                }
            }
        }

        ExecutionResult::failed(ALL_EXHAUSTED, attempts, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use std::future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::events::test_support::RecordingSink;

    fn profile(id: &str, priority: i32) -> ExecutionProfile {
        ExecutionProfile::new(id, "anthropic", "key").with_priority(priority)
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            ladder: ThinkingLevel::LADDER.to_vec(),
        }
    }

    fn executor(profiles: Vec<ExecutionProfile>) -> Executor {
        Executor::new(profiles, fast_config(), PoolConfig::default())
    }

    #[tokio::test]
    async fn first_success_records_one_attempt() {
        let mut exec = executor(vec![profile("a", 10), profile("b", 5), profile("c", 1)]);

        let result = exec
            .execute(
                |p, _, _| {
                    let id = p.id.as_str().to_string();
                    async move { Ok::<_, WorkError>(id) }
                },
                ExecuteOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.value.as_deref(), Some("a"));
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.profile, Some("a".into()));

        // B and C were never touched.
        for status in exec.profile_status() {
            assert!(!status.locked);
            assert_eq!(status.failure_count, 0);
        }
    }

    #[tokio::test]
    async fn empty_pool_fails_immediately() {
        let mut exec = executor(vec![]);

        let result = exec
            .execute(
                |_, _, _| async { Ok::<_, WorkError>(()) },
                ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No available auth profiles"));
        assert!(result.attempts.is_empty());
    }

    #[tokio::test]
    async fn auth_failures_lock_every_profile() {
        let mut exec = executor(vec![profile("a", 3), profile("b", 2), profile("c", 1)]);

        let result = exec
            .execute(
                |_, _, _| async { Err::<(), _>(WorkError::new("401 unauthorized")) },
                ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("All profiles exhausted"));
        // One attempt per profile: auth failures rotate, never retry in place.
        assert_eq!(result.attempts.len(), 3);
        for status in exec.profile_status() {
            assert!(status.locked);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_consume_retry_budget() {
        let mut exec = executor(vec![profile("a", 0)]);

        let result = exec
            .execute(
                |_, _, _| async { Err::<(), _>(WorkError::new("connection reset")) },
                ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        // max_retries attempts on the single profile.
        assert_eq!(result.attempts.len(), 3);
        // Network errors do not lock the profile.
        assert!(!exec.profile_status()[0].locked);
    }

    #[tokio::test]
    async fn unknown_errors_are_not_retried() {
        let mut exec = executor(vec![profile("a", 1), profile("b", 0)]);

        let result = exec
            .execute(
                |_, _, _| async { Err::<(), _>(WorkError::new("inscrutable")) },
                ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        // One attempt per profile, no in-place retries, no locks.
        assert_eq!(result.attempts.len(), 2);
        for status in exec.profile_status() {
            assert!(!status.locked);
        }
    }

    #[tokio::test]
    async fn rate_limit_rotates_to_next_profile() {
        let mut exec = executor(vec![profile("primary", 10), profile("backup", 1)]);

        let result = exec
            .execute(
                |p, _, _| {
                    let ok = p.id.as_str() == "backup";
                    async move {
                        if ok {
                            Ok("done")
                        } else {
                            Err(WorkError::new("429 too many requests"))
                        }
                    }
                },
                ExecuteOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.profile, Some("backup".into()));
        assert_eq!(result.attempts.len(), 2);
        assert!(!result.attempts[0].success);
        assert_eq!(
            result.attempts[0].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::RateLimit)
        );

        let status = exec.profile_status();
        let primary = status.iter().find(|s| s.id.as_str() == "primary").unwrap();
        assert!(primary.locked);
    }

    #[tokio::test]
    async fn thinking_fallback_is_free_and_walks_the_ladder() {
        let mut exec = executor(vec![profile("a", 0)]);
        let sink = Arc::new(RecordingSink::default());
        exec = exec.with_sink(sink.clone());

        let result = exec
            .execute(
                |_, thinking, _| async move {
                    if thinking == ThinkingLevel::Low {
                        Ok(thinking)
                    } else {
                        Err(WorkError::new("extended thinking not supported"))
                    }
                },
                ExecuteOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.value, Some(ThinkingLevel::Low));
        // High and Medium failed, Low succeeded; all free retries, so the
        // retry budget of 3 was never the limiting factor.
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(result.attempts[0].thinking, ThinkingLevel::High);
        assert_eq!(result.attempts[1].thinking, ThinkingLevel::Medium);
        assert_eq!(result.attempts[2].thinking, ThinkingLevel::Low);

        let fallbacks = sink
            .events()
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::ThinkingFallback { .. }))
            .count();
        assert_eq!(fallbacks, 2);
    }

    #[tokio::test]
    async fn thinking_ladder_exhaustion_falls_back_to_retry_path() {
        let mut config = fast_config();
        config.ladder = vec![ThinkingLevel::Off];
        let mut exec = Executor::new(vec![profile("a", 0)], config, PoolConfig::default());

        let calls = AtomicU32::new(0);
        let result = exec
            .execute(
                |_, _, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(WorkError::new("thinking not supported")) }
                },
                ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        // Ladder has nowhere to go; ThinkingLevel is retryable, so the
        // budget of 3 applies.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    struct FixedCompactor {
        replacement: Vec<Message>,
        succeed: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Compactor for FixedCompactor {
        async fn compact(&self, _messages: &[Message]) -> anyhow::Result<CompactionOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CompactionOutcome {
                success: self.succeed,
                messages: self.replacement.clone(),
            })
        }
    }

    #[tokio::test]
    async fn context_overflow_triggers_compaction_and_free_retry() {
        let mut exec = executor(vec![profile("a", 0)]);
        let compactor = FixedCompactor {
            replacement: vec![Message::user("compacted")],
            succeed: true,
            calls: AtomicU32::new(0),
        };

        let attempt = AtomicU32::new(0);
        let result = exec
            .execute(
                |_, _, messages| {
                    let n = attempt.fetch_add(1, Ordering::SeqCst);
                    let seen = messages.len();
                    async move {
                        if n == 0 {
                            Err(WorkError::new("prompt is too long"))
                        } else {
                            Ok(seen)
                        }
                    }
                },
                ExecuteOptions {
                    messages: vec![
                        Message::user("one"),
                        Message::user("two"),
                        Message::user("three"),
                    ],
                    compactor: Some(&compactor),
                },
            )
            .await;

        assert!(result.success);
        // The retried attempt saw the replaced message list.
        assert_eq!(result.value, Some(1));
        assert_eq!(compactor.calls.load(Ordering::SeqCst), 1);
        // Free retry: two attempts recorded, same profile.
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].profile, result.attempts[1].profile);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_compaction_falls_through_to_generic_retry() {
        let mut exec = executor(vec![profile("a", 0)]);
        let compactor = FixedCompactor {
            replacement: vec![],
            succeed: false,
            calls: AtomicU32::new(0),
        };

        let result = exec
            .execute(
                |_, _, _| async { Err::<(), _>(WorkError::new("maximum context exceeded")) },
                ExecuteOptions {
                    messages: vec![Message::user("hello")],
                    compactor: Some(&compactor),
                },
            )
            .await;

        assert!(!result.success);
        // Context overflow is retryable, so the normal budget applied.
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(compactor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_compaction_consumes_retry_budget() {
        let mut exec = executor(vec![profile("a", 0)]);
        // Claims success but returns the history unchanged.
        let compactor = FixedCompactor {
            replacement: vec![Message::user("hello")],
            succeed: true,
            calls: AtomicU32::new(0),
        };

        let result = exec
            .execute(
                |_, _, _| async { Err::<(), _>(WorkError::new("context window exceeded")) },
                ExecuteOptions {
                    messages: vec![Message::user("hello")],
                    compactor: Some(&compactor),
                },
            )
            .await;

        // No free retry without progress: the normal budget bounds the loop.
        assert!(!result.success);
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(compactor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.error.as_deref(), Some("All profiles exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_without_compactor_uses_generic_retry() {
        let mut exec = executor(vec![profile("a", 0)]);

        let result = exec
            .execute(
                |_, _, _| async { Err::<(), _>(WorkError::new("token limit exceeded")) },
                ExecuteOptions {
                    messages: vec![Message::user("hello")],
                    compactor: None,
                },
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_work() {
        let mut exec = executor(vec![profile("a", 0)]);
        let token = exec.cancellation_token();

        let result = exec
            .execute(
                move |_, _, _| {
                    let token = token.clone();
                    async move {
                        token.cancel();
                        // Never resolves; cancellation must win the race.
                        future::pending::<Result<(), WorkError>>().await
                    }
                },
                ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Execution cancelled"));
    }

    #[tokio::test]
    async fn events_are_emitted_in_lifecycle_order() {
        let sink = Arc::new(RecordingSink::default());
        let mut exec = executor(vec![profile("a", 0)]).with_sink(sink.clone());

        let result = exec
            .execute(
                |_, _, _| async { Ok::<_, WorkError>(()) },
                ExecuteOptions::default(),
            )
            .await;
        assert!(result.success);

        let events = sink.events();
        assert!(matches!(events[0], ExecutionEvent::AttemptStart { .. }));
        assert!(matches!(events[1], ExecutionEvent::AttemptSuccess { .. }));
        assert!(matches!(events[2], ExecutionEvent::ProfileSucceeded { .. }));
    }

    #[tokio::test]
    async fn add_remove_unlock_emit_events() {
        let sink = Arc::new(RecordingSink::default());
        let mut exec = executor(vec![]).with_sink(sink.clone());

        exec.add_profile(profile("a", 0)).expect("add");
        exec.remove_profile(&"a".into()).expect("remove");
        exec.unlock_all();

        let events = sink.events();
        assert!(matches!(events[0], ExecutionEvent::ProfileAdded { .. }));
        assert!(matches!(events[1], ExecutionEvent::ProfileRemoved { .. }));
        assert!(matches!(events[2], ExecutionEvent::PoolUnlocked));
    }

    #[test]
    fn retry_delay_respects_floor_and_cap() {
        let config = ExecutorConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ladder: vec![ThinkingLevel::Off],
        };

        for retry_count in 1..=6 {
            let floor = Duration::from_millis(100 * (1 << (retry_count - 1)));
            for _ in 0..50 {
                let delay = retry_delay(&config, retry_count as u32);
                assert!(delay >= floor.min(config.max_delay), "below floor at {retry_count}");
                assert!(delay <= config.max_delay);
            }
        }
    }
}
