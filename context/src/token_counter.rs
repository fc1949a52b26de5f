//! Token counting.
//!
//! Token estimation is model-specific, so the budget manager takes a
//! [`TokenCounter`] as an injected dependency. The provided
//! [`TiktokenCounter`] uses tiktoken's `o200k_base` encoding, which is
//! accurate for OpenAI models and a reasonable approximation for others
//! (Claude and Gemini tokenizers are proprietary; counts may vary ~5-10%).
//! Callers needing precision can implement the trait over a provider's
//! native counting endpoint.

use std::fmt;
use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, o200k_base};

use codebuddy_types::Message;

/// Approximate per-message overhead for role markers and delimiters.
pub const MESSAGE_OVERHEAD: u32 = 4;

/// The tiktoken encoder is expensive to initialize (loads vocabulary data),
/// so we create it once and reuse it across all counter instances.
static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn get_encoder() -> Option<&'static CoreBPE> {
    ENCODER.get_or_init(|| o200k_base().ok()).as_ref()
}

/// Injected token estimation seam.
///
/// Only `count_str` is required; the message-level methods add the shared
/// role/formatting overhead on top of it.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a raw string.
    fn count_str(&self, text: &str) -> u32;

    /// Count tokens for a single message, including role overhead.
    fn count_message(&self, msg: &Message) -> u32 {
        self.count_str(msg.role().as_str()) + self.count_str(msg.content()) + MESSAGE_OVERHEAD
    }

    /// Sum of per-message counts, overhead included.
    fn count_messages(&self, messages: &[Message]) -> u32 {
        messages.iter().map(|msg| self.count_message(msg)).sum()
    }
}

/// Thread-safe approximate counter over tiktoken's `o200k_base` encoding.
///
/// Falls back to byte-length estimates if the encoder fails to initialize.
#[derive(Clone, Copy)]
pub struct TiktokenCounter {
    encoder: Option<&'static CoreBPE>,
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoder", &self.encoder.as_ref().map(|_| "<CoreBPE>"))
            .finish()
    }
}

impl TiktokenCounter {
    #[must_use]
    pub fn new() -> Self {
        let encoder = get_encoder();
        if encoder.is_none() {
            tracing::error!(
                "Failed to initialize tiktoken o200k_base encoder. Falling back to byte-length estimates."
            );
        }

        Self { encoder }
    }
}

impl Default for TiktokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_str(&self, text: &str) -> u32 {
        let len = match self.encoder {
            Some(encoder) => encoder.encode_ordinary(text).len(),
            None => text.len(),
        };

        u32::try_from(len).unwrap_or(u32::MAX)
    }
}
