//! Context budget manager.
//!
//! Tracks the token footprint of a growing conversation against a bounded
//! budget and, when the budget is threatened, applies an escalating ladder
//! of compaction strategies: sliding window, tool-result truncation,
//! extractive summarization, hard truncation. Each stage re-measures before
//! the next one runs; the ladder stops as soon as the sequence fits.
//!
//! The system message, if present, is detached before any stage runs and
//! reattached afterwards - instructions are never compacted. When fewer
//! than 2 messages remain, content-level truncation is the last resort and
//! the budget guarantee is forfeited.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use codebuddy_types::{Message, Role};

use crate::token_counter::TokenCounter;

/// Usage percentage at which [`ContextStats::is_near_limit`] trips.
const NEAR_LIMIT_PERCENT: f32 = 75.0;
/// Usage percentage at which [`ContextStats::is_critical`] trips.
const CRITICAL_PERCENT: f32 = 90.0;
/// Tool output longer than this is clipped by the tool-truncation stage.
const TOOL_RESULT_CLIP_CHARS: usize = 500;
/// Extractive summarization keeps this many leading chars per turn.
const SUMMARY_SNIPPET_CHARS: usize = 100;
/// Last-resort clip applied by hard truncation.
const HARD_CLIP_CHARS: usize = 200;
/// Summary ring capacity; oldest evicted first.
const MAX_SUMMARIES: usize = 50;
/// Cap on preserved key-information lines in enhanced mode.
const MAX_KEY_INFO_LINES: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Configured token ceiling for the model's context window.
    pub max_context_tokens: u32,
    /// Tokens reserved for the model's response; subtracted from the
    /// ceiling to form the effective limit.
    pub response_reserve_tokens: u32,
    /// Absolute token count at which compaction is forced, independent of
    /// the usage percentage.
    pub auto_compact_threshold: u32,
    /// Messages kept verbatim by the sliding-window stage.
    pub recent_messages_count: usize,
    /// Line-cap divisor for extractive summarization.
    pub compression_ratio: f32,
    /// Usage percentages that fire a warning, each at most once.
    pub warn_thresholds: Vec<u8>,
    /// Enhanced mode: key-information preservation, quality metrics and a
    /// recoverable archive of the pre-compaction messages.
    pub enhanced: bool,
    /// Archive ring capacity in enhanced mode.
    pub max_archives: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 200_000,
            response_reserve_tokens: 8_192,
            auto_compact_threshold: 160_000,
            recent_messages_count: 10,
            compression_ratio: 4.0,
            warn_thresholds: vec![50, 75, 90],
            enhanced: false,
            max_archives: 20,
        }
    }
}

/// Point-in-time usage of a message sequence against the budget.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub total_tokens: u32,
    /// Effective limit: configured ceiling minus the response reserve.
    pub max_tokens: u32,
    pub usage_percent: f32,
    pub message_count: usize,
    pub is_near_limit: bool,
    pub is_critical: bool,
}

/// The compaction stage that produced the final state of a
/// [`CompressionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    None,
    SlidingWindow,
    ToolTruncation,
    Summarization,
    HardTruncation,
}

impl CompactionStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SlidingWindow => "sliding_window",
            Self::ToolTruncation => "tool_truncation",
            Self::Summarization => "summarization",
            Self::HardTruncation => "hard_truncation",
        }
    }
}

/// Outcome of one [`ContextBudgetManager::compress`] call.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub compacted: bool,
    pub messages: Vec<Message>,
    pub tokens_before: u32,
    pub tokens_after: u32,
    pub tokens_removed: u32,
    pub strategy: CompactionStrategy,
}

/// One extractive summary produced by the summarization stage.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub content: String,
    pub token_count: u32,
    pub replaced_messages: usize,
    pub created_at: SystemTime,
}

/// Quality telemetry recorded per compaction in enhanced mode.
#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    /// `tokens_before / tokens_after`, >= 1.0 for an effective compaction.
    pub compression_ratio: f32,
    pub preserved_count: usize,
    pub removed_count: usize,
    pub duration: Duration,
}

/// Memory accounting over the manager's bounded internal stores.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryMetrics {
    pub summary_count: usize,
    pub summary_tokens: u32,
    pub archive_count: usize,
    pub fired_warnings: Vec<u8>,
    pub last_quality: Option<QualityMetrics>,
}

#[derive(Debug, Clone)]
struct ContextArchive {
    id: String,
    messages: Vec<Message>,
}

/// Token-budget tracker and compaction ladder for one conversation.
pub struct ContextBudgetManager {
    config: BudgetConfig,
    counter: Arc<dyn TokenCounter>,
    summaries: VecDeque<ConversationSummary>,
    fired_warnings: HashSet<u8>,
    archives: VecDeque<ContextArchive>,
    last_quality: Option<QualityMetrics>,
}

impl ContextBudgetManager {
    #[must_use]
    pub fn new(config: BudgetConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            config,
            counter,
            summaries: VecDeque::new(),
            fired_warnings: HashSet::new(),
            archives: VecDeque::new(),
            last_quality: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Configured ceiling minus the response reserve.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.config
            .max_context_tokens
            .saturating_sub(self.config.response_reserve_tokens)
    }

    #[must_use]
    pub fn get_stats(&self, messages: &[Message]) -> ContextStats {
        let total_tokens = self.counter.count_messages(messages);
        let max_tokens = self.effective_limit();
        let usage_percent = usage_percent(total_tokens, max_tokens);

        ContextStats {
            total_tokens,
            max_tokens,
            usage_percent,
            message_count: messages.len(),
            is_near_limit: usage_percent >= NEAR_LIMIT_PERCENT,
            is_critical: usage_percent >= CRITICAL_PERCENT,
        }
    }

    /// Whether the next call should be preceded by compaction.
    #[must_use]
    pub fn should_auto_compact(&self, messages: &[Message]) -> bool {
        self.triggered(self.counter.count_messages(messages))
    }

    fn triggered(&self, total_tokens: u32) -> bool {
        total_tokens >= self.config.auto_compact_threshold
            || usage_percent(total_tokens, self.effective_limit()) > NEAR_LIMIT_PERCENT
    }

    /// Highest not-yet-fired warning threshold at or below current usage.
    ///
    /// Each configured threshold fires at most once per manager lifetime,
    /// even if usage oscillates above and below it.
    pub fn should_warn(&mut self, messages: &[Message]) -> Option<u8> {
        let percent = usage_percent(self.counter.count_messages(messages), self.effective_limit());

        let mut thresholds = self.config.warn_thresholds.clone();
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        for threshold in thresholds {
            if percent >= f32::from(threshold) && self.fired_warnings.insert(threshold) {
                tracing::warn!(threshold, percent, "context usage threshold crossed");
                return Some(threshold);
            }
        }
        None
    }

    /// Prepare a message sequence for the next call, compacting if needed.
    ///
    /// The returned sequence fits the effective limit unless fewer than 2
    /// messages remain after hard truncation.
    #[must_use]
    pub fn prepare_messages(&mut self, messages: Vec<Message>) -> Vec<Message> {
        self.compress(messages).messages
    }

    /// Run the compaction ladder over a message sequence.
    pub fn compress(&mut self, messages: Vec<Message>) -> CompressionResult {
        let tokens_before = self.counter.count_messages(&messages);
        if !self.triggered(tokens_before) {
            return CompressionResult {
                compacted: false,
                messages,
                tokens_before,
                tokens_after: tokens_before,
                tokens_removed: 0,
                strategy: CompactionStrategy::None,
            };
        }

        let compaction_started = Instant::now();
        let original_count = messages.len();
        if self.config.enhanced {
            self.archive(&messages);
        }

        let mut working = messages;
        let system_index = working.iter().position(Message::is_system);
        let system = system_index.map(|index| working.remove(index));
        let key_info = if self.config.enhanced {
            extract_key_information(&working)
        } else {
            Vec::new()
        };

        let limit = self.effective_limit();
        let mut strategy = CompactionStrategy::None;

        // Stage 1: sliding window. Keep the most recent messages, replace
        // the rest with a single marker. Runs whenever compaction was
        // triggered, not only once the limit is already exceeded, so the
        // auto-compact threshold and the 75% trigger compact preemptively.
        if working.len() > self.config.recent_messages_count {
            let dropped = working.len() - self.config.recent_messages_count;
            working.drain(..dropped);
            working.insert(
                0,
                Message::system(format!(
                    "[{dropped} earlier messages removed to fit the context budget]"
                )),
            );
            strategy = CompactionStrategy::SlidingWindow;
        }

        // Stage 2: clip oversized tool output in place; ordering and roles
        // unchanged.
        if self.over_budget(system.as_ref(), &working, limit) {
            let mut clipped_any = false;
            for msg in &mut working {
                if msg.is_tool_result() && msg.content().chars().count() > TOOL_RESULT_CLIP_CHARS {
                    let clipped: String =
                        msg.content().chars().take(TOOL_RESULT_CLIP_CHARS).collect();
                    *msg = msg.with_content(format!("{clipped}\n[tool output truncated]"));
                    clipped_any = true;
                }
            }
            if clipped_any {
                strategy = CompactionStrategy::ToolTruncation;
            }
        }

        // Stage 3: reduce everything beyond the recent window to an
        // extractive summary; the recent window stays verbatim.
        if self.over_budget(system.as_ref(), &working, limit)
            && working.len() > self.config.recent_messages_count
        {
            let split = working.len() - self.config.recent_messages_count;
            let older: Vec<Message> = working.drain(..split).collect();
            let content = self.summarize(&older);
            working.insert(0, Message::system(content));
            strategy = CompactionStrategy::Summarization;
        }

        // Preserved key information rides along as a note. It sits at the
        // front so hard truncation sacrifices it first if the budget
        // demands. Only added once a stage has actually removed content;
        // an untouched sequence must come back untouched.
        if strategy != CompactionStrategy::None && !key_info.is_empty() {
            let mut note = String::from("[Preserved key information]");
            for line in &key_info {
                note.push_str("\n- ");
                note.push_str(line);
            }
            working.insert(0, Message::system(note));
        }

        // Stage 4: drop oldest while more than 2 remain, then clip content.
        // Records the strategy only when it changed something; a pass that
        // cannot shrink further must not claim success, or callers treating
        // a successful compaction as grounds for a free retry never stop.
        if self.over_budget(system.as_ref(), &working, limit) {
            let mut changed = false;
            while self.over_budget(system.as_ref(), &working, limit) && working.len() > 2 {
                working.remove(0);
                changed = true;
            }
            if self.over_budget(system.as_ref(), &working, limit) {
                for msg in &mut working {
                    if msg.content().chars().count() > HARD_CLIP_CHARS {
                        let clipped: String = msg.content().chars().take(HARD_CLIP_CHARS).collect();
                        *msg = msg.with_content(clipped);
                        changed = true;
                    }
                }
            }
            if changed {
                strategy = CompactionStrategy::HardTruncation;
            }
        }

        if let Some(system) = system {
            let index = if strategy == CompactionStrategy::None {
                system_index.unwrap_or(0).min(working.len())
            } else {
                0
            };
            working.insert(index, system);
        }

        // Triggered but nothing to do: hand the sequence back exactly as it
        // came in, and drop the speculative archive.
        if strategy == CompactionStrategy::None {
            if self.config.enhanced {
                self.archives.pop_back();
            }
            return CompressionResult {
                compacted: false,
                messages: working,
                tokens_before,
                tokens_after: tokens_before,
                tokens_removed: 0,
                strategy,
            };
        }

        let tokens_after = self.counter.count_messages(&working);
        if self.config.enhanced {
            self.last_quality = Some(QualityMetrics {
                compression_ratio: tokens_before as f32 / f32::max(tokens_after as f32, 1.0),
                preserved_count: key_info.len(),
                removed_count: original_count.saturating_sub(working.len()),
                duration: compaction_started.elapsed(),
            });
        }
        tracing::debug!(
            strategy = strategy.as_str(),
            tokens_before,
            tokens_after,
            messages = working.len(),
            "context compacted"
        );

        CompressionResult {
            compacted: strategy != CompactionStrategy::None,
            messages: working,
            tokens_before,
            tokens_after,
            tokens_removed: tokens_before.saturating_sub(tokens_after),
            strategy,
        }
    }

    fn over_budget(&self, system: Option<&Message>, working: &[Message], limit: u32) -> bool {
        let system_tokens = system.map_or(0, |msg| self.counter.count_message(msg));
        system_tokens.saturating_add(self.counter.count_messages(working)) > limit
    }

    fn summarize(&mut self, older: &[Message]) -> String {
        let ratio = self.config.compression_ratio.max(1.0);
        let max_lines = ((older.len() as f32) / ratio).ceil().max(1.0) as usize;

        let mut lines: Vec<String> = Vec::new();
        for msg in older {
            if lines.len() >= max_lines {
                break;
            }
            if matches!(msg.role(), Role::User | Role::Assistant) {
                let snippet: String = msg.content().chars().take(SUMMARY_SNIPPET_CHARS).collect();
                lines.push(format!("{}: {snippet}", msg.role().as_str()));
            }
        }

        let content = format!(
            "[Summary of {} earlier messages]\n{}",
            older.len(),
            lines.join("\n")
        );
        let summary = ConversationSummary {
            token_count: self.counter.count_str(&content),
            content: content.clone(),
            replaced_messages: older.len(),
            created_at: SystemTime::now(),
        };
        self.summaries.push_back(summary);
        while self.summaries.len() > MAX_SUMMARIES {
            self.summaries.pop_front();
        }
        content
    }

    fn archive(&mut self, messages: &[Message]) {
        self.archives.push_back(ContextArchive {
            id: Uuid::new_v4().to_string(),
            messages: messages.to_vec(),
        });
        while self.archives.len() > self.config.max_archives {
            self.archives.pop_front();
        }
    }

    /// Recover the pre-compaction message set archived in enhanced mode.
    ///
    /// With no id, returns the most recent archive.
    #[must_use]
    pub fn recover_full_context(&self, archive_id: Option<&str>) -> Option<Vec<Message>> {
        match archive_id {
            Some(id) => self
                .archives
                .iter()
                .find(|archive| archive.id == id)
                .map(|archive| archive.messages.clone()),
            None => self.archives.back().map(|archive| archive.messages.clone()),
        }
    }

    /// Identifiers of recoverable archives, oldest first.
    #[must_use]
    pub fn archive_ids(&self) -> Vec<String> {
        self.archives.iter().map(|a| a.id.clone()).collect()
    }

    #[must_use]
    pub fn summaries(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.summaries.iter()
    }

    #[must_use]
    pub fn get_memory_metrics(&self) -> MemoryMetrics {
        let mut fired: Vec<u8> = self.fired_warnings.iter().copied().collect();
        fired.sort_unstable();
        MemoryMetrics {
            summary_count: self.summaries.len(),
            summary_tokens: self.summaries.iter().map(|s| s.token_count).sum(),
            archive_count: self.archives.len(),
            fired_warnings: fired,
            last_quality: self.last_quality.clone(),
        }
    }
}

/// Usage as a percentage of the limit. A zero limit reads as fully used
/// whenever anything is counted at all.
#[must_use]
pub fn usage_percent(total: u32, limit: u32) -> f32 {
    if limit == 0 {
        if total > 0 { 100.0 } else { 0.0 }
    } else {
        total as f32 / limit as f32 * 100.0
    }
}

/// Extract lines worth preserving across a compaction: decisions, errors,
/// file mutations and tool-call references.
fn extract_key_information(messages: &[Message]) -> Vec<String> {
    const MARKERS: &[&str] = &[
        "decided",
        "decision",
        "error",
        "failed",
        "created ",
        "wrote ",
        "edited ",
        "deleted ",
        "call_",
        "toolu_",
    ];

    let mut lines = Vec::new();
    for msg in messages {
        for line in msg.content().lines() {
            if lines.len() >= MAX_KEY_INFO_LINES {
                return lines;
            }
            let lowered = line.to_lowercase();
            if MARKERS.iter().any(|marker| lowered.contains(marker)) {
                let snippet: String = line.trim().chars().take(120).collect();
                if !snippet.is_empty() {
                    lines.push(snippet);
                }
            }
        }
    }
    lines
}
