//! Token-budget history truncation.
//!
//! History is kept newest-first while it fits. The first message that does
//! not fit collapses itself and everything older into a single placeholder
//! turn; there is no partial dropping.

use super::token::{estimate_message_tokens, estimate_tokens};
use convoy_core::message::Message;
use convoy_core::provider::ContextLimits;

/// The window handed to the formatter.
#[derive(Debug, Clone)]
pub struct Truncation {
    /// Kept history followed by the pending prompt, or the lone placeholder.
    pub messages: Vec<Message>,
    /// How many history messages were dropped.
    pub omitted: usize,
}

impl Truncation {
    pub fn was_truncated(&self) -> bool {
        self.omitted > 0
    }
}

/// Bounds history to a prompt token budget.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgetTruncator {
    budget: usize,
}

impl TokenBudgetTruncator {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    /// Budget = context limit − output limit − reserved buffer.
    pub fn for_limits(limits: &ContextLimits, reserved_buffer: u32) -> Self {
        Self::new(limits.prompt_budget(reserved_buffer) as usize)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Fit `history` plus `pending_prompt` under the budget.
    ///
    /// Always returns at least one message.
    pub fn truncate(
        &self,
        history: &[Message],
        system: Option<&str>,
        pending_prompt: &str,
    ) -> Truncation {
        let fixed = system.map(estimate_tokens).unwrap_or(0) + estimate_tokens(pending_prompt);
        let mut available = self.budget as i64 - fixed as i64;

        for (index, msg) in history.iter().enumerate().rev() {
            let tokens = estimate_message_tokens(msg) as i64;
            if available - tokens < 0 {
                let omitted = index + 1;
                return Truncation {
                    messages: vec![Message::user(placeholder(omitted, pending_prompt))],
                    omitted,
                };
            }
            available -= tokens;
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(Message::user(pending_prompt));
        Truncation {
            messages,
            omitted: 0,
        }
    }
}

fn placeholder(omitted: usize, pending_prompt: &str) -> String {
    format!("[context truncated — {omitted} earlier messages omitted] {pending_prompt}")
}

/// Window used after the provider rejected the prompt as too long: the last
/// two history messages and the pending prompt.
pub fn emergency_window(history: &[Message], pending_prompt: &str) -> Vec<Message> {
    let start = history.len().saturating_sub(2);
    let mut messages = history[start..].to_vec();
    messages.push(Message::user(pending_prompt));
    messages
}
