//! Message-level token budgeting against a model's context window
//!
//! Chat messages are costed as `"{role}: {content}\n\n"` plus a fixed
//! per-message overhead for the wire framing the provider adds.

use super::completion::ChatMessage;
use super::token_estimator::{estimator_for_model, max_context};
use serde::{Deserialize, Serialize};

/// Approximate framing cost per chat message
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Headroom kept free when estimating what is left for a reply
pub const SAFETY_BUFFER_TOKENS: usize = 50;

/// Token usage of a message list against a model budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub model: String,
    pub max_context: usize,
    pub used: usize,
    pub remaining: usize,
}

impl BudgetReport {
    /// Build a report for `messages` on `model`
    pub fn for_messages(messages: &[ChatMessage], model: &str) -> Self {
        let used = count_message_tokens(messages, model);
        let max_context = max_context(model);
        Self {
            model: model.to_string(),
            max_context,
            used,
            remaining: max_context.saturating_sub(used).saturating_sub(SAFETY_BUFFER_TOKENS),
        }
    }

    /// Whether the messages exceed the model window
    pub fn is_over_budget(&self) -> bool {
        self.used > self.max_context
    }
}

/// Count tokens for a chat message list, framing included
pub fn count_message_tokens(messages: &[ChatMessage], model: &str) -> usize {
    let text: String = messages
        .iter()
        .map(|m| format!("{}: {}\n\n", m.role, m.content))
        .collect();
    estimator_for_model(model).estimate(&text) + MESSAGE_OVERHEAD_TOKENS * messages.len()
}

/// Tokens still available for a reply, after the safety buffer
pub fn estimate_tokens_left(messages: &[ChatMessage], model: &str) -> usize {
    BudgetReport::for_messages(messages, model).remaining
}

/// Whether `text` fits in what is left of the window after `messages`
pub fn can_fit_in_context(text: &str, messages: &[ChatMessage], model: &str) -> bool {
    estimator_for_model(model).estimate(text) <= estimate_tokens_left(messages, model)
}

/// Truncate `text` to at most `max_tokens` tokens for `model`
pub fn truncate_text_to_fit(text: &str, max_tokens: usize, model: &str) -> String {
    let estimator = estimator_for_model(model);
    if estimator.estimate(text) <= max_tokens {
        return text.to_string();
    }
    estimator.truncate(text, max_tokens)
}
