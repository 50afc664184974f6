//! Token-bounded context windows
//!
//! History is packed newest to oldest; grounding fragments are packed in
//! score order into their own share of the budget. Whatever grounding does
//! not use is left to history.

use sdk::types::GroundingFragment;
use serde::{Deserialize, Serialize};

use super::session::Message;

/// Rough estimate: 1 token ≈ 4 characters
const CHARS_PER_TOKEN: usize = 4;

/// Per-entry overhead for role and framing
const ENTRY_OVERHEAD: usize = 4;

/// Context handed to agents for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Most recent first
    pub messages: Vec<Message>,
    /// Highest score first
    pub grounding: Vec<GroundingFragment>,
    pub used_tokens: usize,
    /// True when the vector lookup failed or timed out
    pub grounding_degraded: bool,
}

impl ContextWindow {
    /// History rendered as `role: content` lines, most recent first
    pub fn history_lines(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect()
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN) + ENTRY_OVERHEAD
}

/// Pack a window into `max_tokens`.
///
/// `history` is oldest first, as stored. `fragments` must already be sorted
/// by score. The history window is contiguous: it stops at the first message
/// that does not fit.
pub fn assemble(
    history: &[Message],
    fragments: Vec<GroundingFragment>,
    max_tokens: usize,
    grounding_share: f64,
    grounding_degraded: bool,
) -> ContextWindow {
    let grounding_budget = (max_tokens as f64 * grounding_share).floor() as usize;

    let mut used_tokens = 0;
    let mut grounding = Vec::new();
    for fragment in fragments {
        let tokens = estimate_tokens(&fragment.source_text);
        if used_tokens + tokens > grounding_budget {
            continue;
        }
        used_tokens += tokens;
        grounding.push(fragment);
    }

    let mut messages = Vec::new();
    for message in history.iter().rev() {
        let tokens = estimate_tokens(&message.content);
        if used_tokens + tokens > max_tokens {
            break;
        }
        used_tokens += tokens;
        messages.push(message.clone());
    }

    ContextWindow {
        messages,
        grounding,
        used_tokens,
        grounding_degraded,
    }
}
