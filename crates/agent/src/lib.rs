//! The agent loop: stream a model turn, run the tools it asks for, repeat.
//!
//! One run goes through these steps:
//!
//! 1. **Truncate** history to the model's prompt budget
//! 2. **Format** it once into the provider's native message array
//! 3. **Stream** a round and accumulate text and tool calls
//! 4. **If tool calls**: execute them, append the invocation and results, go to 3
//! 5. **Otherwise** return the text
//!
//! Every run is bounded by an iteration cap, a per-round deadline and an
//! overall deadline. Hitting any of them ends the run with the text gathered
//! so far and a notice; provider and tool failures are errors.

pub mod context;
pub mod loop_runner;

pub use context::{
    TokenBudgetTruncator, Truncation, emergency_window, estimate_message_tokens,
    estimate_messages_tokens, estimate_tokens,
};
pub use loop_runner::{
    AgentLoop, AgentOutcome, COMPLETION_SENTINEL, LoopLimits, StopReason, run_agent_loop,
};
