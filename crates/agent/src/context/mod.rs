//! Bounding the conversation to the model's window.
//!
//! Token counts are estimated, not measured: see [`token`].

pub mod token;
pub mod truncator;

pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
pub use truncator::{TokenBudgetTruncator, Truncation, emergency_window};
