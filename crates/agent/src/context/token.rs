//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~3 characters per token, counted in
//! characters rather than bytes. It over-counts English and under-counts
//! CJK scripts; it is only meant to keep requests comfortably inside the
//! window.

use convoy_core::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 3 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(3)
}

/// Estimate tokens for a single message, including tool-call arguments.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content)
        + message
            .tool_calls
            .iter()
            .map(|tc| estimate_tokens(&tc.arguments))
            .sum::<usize>()
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
