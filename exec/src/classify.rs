//! Error taxonomy and classification.
//!
//! Failures coming back from a unit of work are free-form: provider SDKs,
//! HTTP stacks and gateways all word the same condition differently. This
//! module maps that text onto a small taxonomy plus three independent policy
//! flags the orchestrator acts on.
//!
//! Classification is a prioritized rule table, not control flow: rules are
//! evaluated in order and the first match wins. Order matters because the
//! categories overlap in vocabulary ("context limit" vs "rate limit" both
//! contain "limit").

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a unit of work.
///
/// Carries the human-readable message plus an optional provider/HTTP code;
/// both feed into classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WorkError {
    message: String,
    code: Option<String>,
}

impl WorkError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl ToString) -> Self {
        self.code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl From<anyhow::Error> for WorkError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Error taxonomy. Every kind except [`ErrorKind::Unknown`] is retryable in
/// some form (same profile, rotated profile, or degraded capability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContextOverflow,
    RateLimit,
    AuthFailure,
    ThinkingLevel,
    ModelUnavailable,
    NetworkError,
    Timeout,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextOverflow => "context_overflow",
            Self::RateLimit => "rate_limit",
            Self::AuthFailure => "auth_failure",
            Self::ThinkingLevel => "thinking_level",
            Self::ModelUnavailable => "model_unavailable",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

/// A classified failure: taxonomy kind plus the policy flags the
/// orchestrator consumes. Derived deterministically, never mutated.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub requires_rotation: bool,
    pub requires_compaction: bool,
    /// The failure as reported by the unit of work.
    pub source: WorkError,
}

/// One row of the classification table: keyword needles mapped to a kind
/// and its policy flags.
struct Rule {
    kind: ErrorKind,
    needles: &'static [&'static str],
    retryable: bool,
    rotate: bool,
    compact: bool,
}

/// Evaluated top to bottom; first match wins.
const RULES: &[Rule] = &[
    Rule {
        kind: ErrorKind::ContextOverflow,
        needles: &[
            "context length",
            "context_length_exceeded",
            "context window",
            "maximum context",
            "token limit",
            "too many tokens",
            "prompt is too long",
            "input is too long",
        ],
        retryable: true,
        rotate: false,
        compact: true,
    },
    Rule {
        kind: ErrorKind::RateLimit,
        needles: &["rate limit", "rate_limit", "429", "quota", "too many requests"],
        retryable: true,
        rotate: true,
        compact: false,
    },
    Rule {
        kind: ErrorKind::AuthFailure,
        needles: &[
            "unauthorized",
            "401",
            "403",
            "forbidden",
            "invalid api key",
            "authentication",
        ],
        retryable: true,
        rotate: true,
        compact: false,
    },
    Rule {
        kind: ErrorKind::ThinkingLevel,
        needles: &[
            "thinking",
            "reasoning effort",
            "reasoning_effort",
            "reasoning is not supported",
        ],
        retryable: true,
        rotate: false,
        compact: false,
    },
    Rule {
        kind: ErrorKind::ModelUnavailable,
        needles: &[
            "model not found",
            "model_not_found",
            "no such model",
            "unsupported model",
            "model is overloaded",
            "model unavailable",
        ],
        retryable: true,
        rotate: true,
        compact: false,
    },
    Rule {
        kind: ErrorKind::NetworkError,
        needles: &[
            "network",
            "connection",
            "econnrefused",
            "econnreset",
            "enotfound",
            "dns",
            "socket hang up",
            "fetch failed",
        ],
        retryable: true,
        rotate: false,
        compact: false,
    },
    Rule {
        kind: ErrorKind::Timeout,
        needles: &["timeout", "timed out", "etimedout", "deadline exceeded"],
        retryable: true,
        rotate: false,
        compact: false,
    },
];

/// Classify a failure into its taxonomy kind and policy flags.
///
/// Matching is case-insensitive substring search over the message and the
/// optional code. Side-effect free and deterministic: the same input always
/// yields the same classification.
#[must_use]
pub fn classify(error: &WorkError) -> ClassifiedError {
    let mut haystack = error.message().to_lowercase();
    if let Some(code) = error.code() {
        haystack.push(' ');
        haystack.push_str(&code.to_lowercase());
    }

    for rule in RULES {
        if rule.needles.iter().any(|needle| haystack.contains(needle)) {
            return ClassifiedError {
                kind: rule.kind,
                message: error.message().to_string(),
                retryable: rule.retryable,
                requires_rotation: rule.rotate,
                requires_compaction: rule.compact,
                source: error.clone(),
            };
        }
    }

    // Only Unknown is terminal.
    ClassifiedError {
        kind: ErrorKind::Unknown,
        message: error.message().to_string(),
        retryable: false,
        requires_rotation: false,
        requires_compaction: false,
        source: error.clone(),
    }
}
