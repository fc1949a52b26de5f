//! Restorable compression.
//!
//! Ordinary compaction throws information away. This module trades full
//! content for a recoverable stub instead: before a long message is
//! dropped, stable identifiers (file paths, URLs, tool-call ids) are
//! extracted from it and the full content is stored keyed by identifier.
//! A later `restore(identifier)` call answers from the in-memory store,
//! falling back to disk for tool-call ids and to a direct filesystem read
//! for file paths.
//!
//! The store is bounded by a byte cap and evicted in insertion order; the
//! bound is a hard invariant, enforced on every insert.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use codebuddy_types::Message;

use crate::token_counter::TokenCounter;

/// Messages shorter than this pass through untouched.
const MIN_COMPRESS_CHARS: usize = 200;
/// Identifiers listed verbatim in a stub; the rest become a count.
const STUB_IDENTIFIER_LIMIT: usize = 5;
/// Default byte cap for the identifier store.
const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
/// Relative directory where tool results are journaled to disk.
const TOOL_RESULT_DIR: &str = ".codebuddy/tool-results";

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("valid url regex"))
}

fn file_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b[\w./-]*\w\.(?:rs|ts|tsx|js|jsx|mjs|py|go|java|rb|c|h|cc|cpp|hpp|cs|json|toml|yaml|yml|md|txt|sh|sql|css|html)(?::\d+(?:-\d+)?)?",
        )
        .expect("valid file path regex")
    })
}

fn call_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:call|toolu)_[A-Za-z0-9_-]+").expect("valid call id regex"))
}

/// Trailing punctuation commonly glued onto URLs in prose.
fn trim_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?'])
}

/// What kind of identifier a string is; decides the restore fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentifierKind {
    Url,
    CallId,
    FilePath,
}

fn identifier_kind(identifier: &str) -> IdentifierKind {
    if identifier.starts_with("http://") || identifier.starts_with("https://") {
        IdentifierKind::Url
    } else if identifier.starts_with("call_") || identifier.starts_with("toolu_") {
        IdentifierKind::CallId
    } else {
        IdentifierKind::FilePath
    }
}

/// Extract stable identifiers from content, in order of appearance.
///
/// URLs are extracted first and masked out before the file-path scan so a
/// path-looking URL tail is not double-counted.
fn extract_identifiers(content: &str) -> Vec<String> {
    let mut identifiers: Vec<String> = Vec::new();
    let push_unique = |id: String, out: &mut Vec<String>| {
        if !out.contains(&id) {
            out.push(id);
        }
    };

    let mut masked = content.to_string();
    for found in url_regex().find_iter(content) {
        let url = trim_url(found.as_str());
        if !url.is_empty() {
            push_unique(url.to_string(), &mut identifiers);
        }
        masked.replace_range(found.range(), &" ".repeat(found.len()));
    }

    for found in file_path_regex().find_iter(&masked) {
        push_unique(found.as_str().to_string(), &mut identifiers);
    }

    for found in call_id_regex().find_iter(&masked) {
        push_unique(found.as_str().to_string(), &mut identifiers);
    }

    identifiers
}

/// Result of compressing a message sequence.
#[derive(Debug, Clone)]
pub struct CompressOutcome {
    pub messages: Vec<Message>,
    /// Every identifier extracted across the sequence, in order.
    pub identifiers: Vec<String>,
    pub tokens_saved: u32,
}

/// Answer to a restore request.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub found: bool,
    /// The original content when found; a recovery hint otherwise.
    pub content: String,
}

/// Identifier-keyed content store with disk fallbacks for recovery.
pub struct RestorableCompressor {
    counter: Arc<dyn TokenCounter>,
    workdir: PathBuf,
    max_bytes: usize,
    store: HashMap<String, String>,
    /// Insertion order of store keys; eviction walks from the front.
    order: VecDeque<String>,
    stored_bytes: usize,
}

impl RestorableCompressor {
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            workdir: workdir.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            store: HashMap::new(),
            order: VecDeque::new(),
            stored_bytes: 0,
        }
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Replace long messages with identifier stubs, keeping full content
    /// restorable.
    ///
    /// Messages shorter than 200 chars, or with no extractable identifier,
    /// pass through unchanged.
    pub fn compress(&mut self, messages: &[Message]) -> CompressOutcome {
        let mut out = Vec::with_capacity(messages.len());
        let mut all_identifiers: Vec<String> = Vec::new();
        let mut tokens_saved = 0u32;

        for msg in messages {
            if msg.content().chars().count() < MIN_COMPRESS_CHARS {
                out.push(msg.clone());
                continue;
            }
            let identifiers = extract_identifiers(msg.content());
            if identifiers.is_empty() {
                out.push(msg.clone());
                continue;
            }

            for id in &identifiers {
                self.insert(id.clone(), msg.content().to_string());
            }

            let stub = build_stub(&identifiers);
            tokens_saved = tokens_saved.saturating_add(
                self.counter
                    .count_str(msg.content())
                    .saturating_sub(self.counter.count_str(&stub)),
            );
            out.push(msg.with_content(stub));
            all_identifiers.extend(identifiers);
        }

        CompressOutcome {
            messages: out,
            identifiers: all_identifiers,
            tokens_saved,
        }
    }

    /// Recover full content for an identifier.
    ///
    /// Lookup order: the in-memory store, then the per-call tool-result
    /// file for call ids, then a direct filesystem read for file paths.
    /// URL identifiers with no stored content cannot be recovered locally;
    /// the hint tells the caller to re-fetch.
    pub fn restore(&mut self, identifier: &str) -> RestoreOutcome {
        if let Some(content) = self.store.get(identifier) {
            return RestoreOutcome {
                found: true,
                content: content.clone(),
            };
        }

        match identifier_kind(identifier) {
            IdentifierKind::CallId => {
                let path = self
                    .workdir
                    .join(TOOL_RESULT_DIR)
                    .join(format!("{identifier}.txt"));
                match fs::read_to_string(&path) {
                    Ok(content) => {
                        self.insert(identifier.to_string(), content.clone());
                        RestoreOutcome {
                            found: true,
                            content,
                        }
                    }
                    Err(err) => {
                        tracing::debug!(identifier, error = %err, "tool result not on disk");
                        RestoreOutcome {
                            found: false,
                            content: format!("No stored result for tool call '{identifier}'."),
                        }
                    }
                }
            }
            IdentifierKind::FilePath => {
                let stripped = strip_line_suffix(identifier);
                let path = Path::new(stripped);
                let resolved = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.workdir.join(path)
                };
                match fs::read_to_string(&resolved) {
                    Ok(content) => {
                        self.insert(identifier.to_string(), content.clone());
                        RestoreOutcome {
                            found: true,
                            content,
                        }
                    }
                    Err(_) => RestoreOutcome {
                        found: false,
                        content: format!("No stored content for '{identifier}' and the file could not be read."),
                    },
                }
            }
            IdentifierKind::Url => RestoreOutcome {
                found: false,
                content: format!(
                    "Content for '{identifier}' is no longer stored. Re-fetch the URL directly."
                ),
            },
        }
    }

    /// Evict oldest-inserted entries until the store fits `max_bytes`.
    pub fn evict(&mut self, max_bytes: usize) {
        while self.stored_bytes > max_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(content) = self.store.remove(&oldest) {
                self.stored_bytes = self
                    .stored_bytes
                    .saturating_sub(oldest.len() + content.len());
            }
        }
    }

    /// Stored identifiers, oldest first.
    #[must_use]
    pub fn list_identifiers(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    #[must_use]
    pub fn stored_bytes(&self) -> usize {
        self.stored_bytes
    }

    /// First writer wins; re-inserting an identifier is a no-op.
    fn insert(&mut self, identifier: String, content: String) {
        if self.store.contains_key(&identifier) {
            return;
        }
        self.stored_bytes += identifier.len() + content.len();
        self.order.push_back(identifier.clone());
        self.store.insert(identifier, content);
        // The byte cap is a hard invariant, not a caller courtesy.
        self.evict(self.max_bytes);
    }
}

/// Drop a trailing `:line` or `:line-line` suffix from a file identifier.
fn strip_line_suffix(identifier: &str) -> &str {
    match identifier.rfind(':') {
        Some(index)
            if identifier[index + 1..]
                .chars()
                .all(|c| c.is_ascii_digit() || c == '-')
                && !identifier[index + 1..].is_empty() =>
        {
            &identifier[..index]
        }
        _ => identifier,
    }
}

fn build_stub(identifiers: &[String]) -> String {
    let listed = identifiers
        .iter()
        .take(STUB_IDENTIFIER_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let remainder = identifiers.len().saturating_sub(STUB_IDENTIFIER_LIMIT);
    let more = if remainder > 0 {
        format!(" (+{remainder} more)")
    } else {
        String::new()
    };
    format!(
        "[Content compressed: {} identifier(s) extracted]\n{listed}{more}\nRestore full content by identifier.",
        identifiers.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ByteCounter;

    impl TokenCounter for ByteCounter {
        fn count_str(&self, text: &str) -> u32 {
            text.len() as u32
        }
    }

    fn compressor(workdir: &Path) -> RestorableCompressor {
        RestorableCompressor::new(workdir, Arc::new(ByteCounter))
    }

    fn long_message(body: &str) -> Message {
        // Pad to clear the 200-char compression floor.
        Message::tool_result(format!("{body}\n{}", "padding ".repeat(30)))
    }

    #[test]
    fn compresses_message_with_path_and_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let msg = long_message("See src/app.ts:42 and https://example.com/doc for details.");
        let outcome = compressor.compress(&[msg.clone()]);

        assert_eq!(outcome.messages.len(), 1);
        let stub = outcome.messages[0].content();
        assert!(stub.contains("src/app.ts:42"));
        assert!(stub.contains("https://example.com/doc"));
        assert!(stub.len() < msg.content().len());
        assert!(outcome.tokens_saved > 0);

        // Full content is restorable by either identifier.
        let restored = compressor.restore("src/app.ts:42");
        assert!(restored.found);
        assert_eq!(restored.content, msg.content());

        let restored = compressor.restore("https://example.com/doc");
        assert!(restored.found);
        assert_eq!(restored.content, msg.content());
    }

    #[test]
    fn short_messages_pass_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let msg = Message::user("quick look at src/app.ts please");
        let outcome = compressor.compress(&[msg.clone()]);

        assert_eq!(outcome.messages[0], msg);
        assert!(outcome.identifiers.is_empty());
        assert_eq!(outcome.tokens_saved, 0);
    }

    #[test]
    fn messages_without_identifiers_pass_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let msg = Message::assistant("no identifiers here ".repeat(20));
        let outcome = compressor.compress(&[msg.clone()]);

        assert_eq!(outcome.messages[0], msg);
        assert!(outcome.identifiers.is_empty());
    }

    #[test]
    fn stub_lists_at_most_five_identifiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let body = (0..8)
            .map(|i| format!("src/module_{i}.rs"))
            .collect::<Vec<_>>()
            .join(" ");
        let outcome = compressor.compress(&[long_message(&body)]);

        assert_eq!(outcome.identifiers.len(), 8);
        let stub = outcome.messages[0].content();
        assert!(stub.contains("src/module_4.rs"));
        assert!(!stub.contains("src/module_5.rs"));
        assert!(stub.contains("(+3 more)"));
    }

    #[test]
    fn first_writer_wins_per_identifier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let first = long_message("first mention of src/lib.rs here");
        let second = long_message("second mention of src/lib.rs here");
        let _ = compressor.compress(&[first.clone()]);
        let _ = compressor.compress(&[second]);

        let restored = compressor.restore("src/lib.rs");
        assert!(restored.found);
        assert_eq!(restored.content, first.content());
    }

    #[test]
    fn unknown_url_returns_refetch_hint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let outcome = compressor.restore("https://example.com/never-seen");
        assert!(!outcome.found);
        assert!(outcome.content.contains("Re-fetch the URL"));
    }

    #[test]
    fn call_id_restores_from_disk_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = dir.path().join(".codebuddy/tool-results");
        fs::create_dir_all(&results).expect("mkdir");
        fs::write(results.join("call_abc123.txt"), "journaled output").expect("write");

        let mut compressor = compressor(dir.path());

        let outcome = compressor.restore("call_abc123");
        assert!(outcome.found);
        assert_eq!(outcome.content, "journaled output");

        // Cached: a second restore works even after the file disappears.
        fs::remove_file(results.join("call_abc123.txt")).expect("rm");
        let outcome = compressor.restore("call_abc123");
        assert!(outcome.found);
        assert_eq!(outcome.content, "journaled output");
    }

    #[test]
    fn missing_call_id_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let outcome = compressor.restore("toolu_gone");
        assert!(!outcome.found);
        assert!(outcome.content.contains("toolu_gone"));
    }

    #[test]
    fn file_path_restore_reads_from_disk_stripping_line_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").expect("write");

        let mut compressor = compressor(dir.path());

        let outcome = compressor.restore("src/main.rs:7-12");
        assert!(outcome.found);
        assert_eq!(outcome.content, "fn main() {}");

        let outcome = compressor.restore("src/missing.rs");
        assert!(!outcome.found);
    }

    #[test]
    fn evict_zero_empties_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut compressor = compressor(dir.path());

        let _ = compressor.compress(&[long_message("src/a.rs src/b.rs https://example.com/x")]);
        assert!(!compressor.list_identifiers().is_empty());

        compressor.evict(0);
        assert!(compressor.list_identifiers().is_empty());
        assert_eq!(compressor.stored_bytes(), 0);
        assert!(!compressor.restore("src/a.rs").found);
    }

    #[test]
    fn byte_cap_evicts_in_insertion_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Each stored entry is ~250 bytes; cap to roughly two entries.
        let mut compressor = compressor(dir.path()).with_max_bytes(600);

        let _ = compressor.compress(&[long_message("alpha src/a.rs")]);
        let _ = compressor.compress(&[long_message("beta src/b.rs")]);
        let _ = compressor.compress(&[long_message("gamma src/c.rs")]);

        let identifiers = compressor.list_identifiers();
        assert!(compressor.stored_bytes() <= 600);
        assert!(!identifiers.contains(&"src/a.rs".to_string()));
        assert!(identifiers.contains(&"src/c.rs".to_string()));
    }

    #[test]
    fn extracts_call_ids_and_strips_url_punctuation() {
        let ids = extract_identifiers(
            "Ran call_xyz9 against https://example.com/api. Also toolu_01AB did work.",
        );
        assert!(ids.contains(&"https://example.com/api".to_string()));
        assert!(ids.contains(&"call_xyz9".to_string()));
        assert!(ids.contains(&"toolu_01AB".to_string()));
    }

    #[test]
    fn url_tail_is_not_double_counted_as_file_path() {
        let ids = extract_identifiers("docs at https://example.com/guide/setup.md today");
        assert_eq!(ids, vec!["https://example.com/guide/setup.md".to_string()]);
    }

    #[test]
    fn strip_line_suffix_variants() {
        assert_eq!(strip_line_suffix("src/app.ts:42"), "src/app.ts");
        assert_eq!(strip_line_suffix("src/app.ts:7-12"), "src/app.ts");
        assert_eq!(strip_line_suffix("src/app.ts"), "src/app.ts");
        assert_eq!(strip_line_suffix("C:no"), "C:no");
    }
}
