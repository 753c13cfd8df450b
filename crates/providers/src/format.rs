//! Conversation shaping for strict-alternation providers.
//!
//! Anthropic and Gemini reject a conversation unless it starts with a user
//! turn and then alternates user/assistant. History rarely looks like that:
//! tool results, consecutive user notes, and windows that begin mid-exchange
//! all have to be folded into a valid sequence first.

use convoy_core::error::ProviderError;
use convoy_core::message::{Message, Role};

/// Marker line placed before a tool result folded into a user turn.
pub const TOOL_RESULT_MARKER: &str = "[tool result]";

/// Placeholder user turn inserted before a leading assistant turn.
pub const CONTINUATION_PLACEHOLDER: &str = "(conversation continued)";

/// One entry of a role-normalized conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Pull system messages out of the window.
///
/// Returns the combined system text (instruction first) and the remaining
/// messages in order.
pub fn split_system<'a>(
    window: &'a [Message],
    instruction: Option<&str>,
) -> (Option<String>, Vec<&'a Message>) {
    let mut system_parts: Vec<&str> = Vec::new();
    if let Some(instruction) = instruction.filter(|s| !s.trim().is_empty()) {
        system_parts.push(instruction);
    }

    let mut rest = Vec::with_capacity(window.len());
    for msg in window {
        match msg.role {
            Role::System => system_parts.push(&msg.content),
            _ => rest.push(msg),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, rest)
}

/// Fold non-system messages into alternating turns.
pub fn format_strict(messages: &[&Message]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => continue,
            Role::Tool => {
                let body = format!("{TOOL_RESULT_MARKER}\n{}", msg.content);
                match turns.last_mut() {
                    Some(last) if last.role == Role::User => {
                        last.content.push('\n');
                        last.content.push_str(&body);
                    }
                    _ => turns.push(Turn::new(Role::User, body)),
                }
            }
            role => match turns.last_mut() {
                Some(last) if last.role == role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&msg.content);
                }
                _ => turns.push(Turn::new(role, msg.content.clone())),
            },
        }
    }

    if turns.first().is_some_and(|t| t.role == Role::Assistant) {
        turns.insert(0, Turn::new(Role::User, CONTINUATION_PLACEHOLDER));
    }
    turns
}

/// Check the alternation rules a strict provider enforces.
pub fn validate_alternation(turns: &[Turn]) -> Result<(), String> {
    let Some(first) = turns.first() else {
        return Err("conversation is empty".into());
    };
    if first.role != Role::User {
        return Err(format!("first turn is {}, expected user", first.role));
    }
    if let Some(turn) = turns
        .iter()
        .find(|t| !matches!(t.role, Role::User | Role::Assistant))
    {
        return Err(format!("role {} is not allowed in the message array", turn.role));
    }
    if let Some(pos) = turns.windows(2).position(|w| w[0].role == w[1].role) {
        return Err(format!(
            "turns {} and {} are both {}",
            pos,
            pos + 1,
            turns[pos].role
        ));
    }
    Ok(())
}

/// Greedy rebuild used when the formatted turns fail validation.
///
/// Drops everything but user/assistant messages, forces the first entry to
/// the user role and merges same-role neighbours. An empty result falls back
/// to the pending prompt alone.
pub fn repair_alternation(messages: &[&Message], pending_prompt: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for msg in messages {
        if !matches!(msg.role, Role::User | Role::Assistant) {
            continue;
        }
        match turns.last_mut() {
            None => turns.push(Turn::new(Role::User, msg.content.clone())),
            Some(last) if last.role == msg.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            Some(_) => turns.push(Turn::new(msg.role, msg.content.clone())),
        }
    }

    if turns.is_empty() {
        turns.push(Turn::new(Role::User, pending_prompt));
    }
    turns
}

/// Format, validate, and repair once if needed.
pub fn alternating_turns(
    messages: &[&Message],
    pending_prompt: &str,
) -> Result<Vec<Turn>, ProviderError> {
    let turns = format_strict(messages);
    let Err(reason) = validate_alternation(&turns) else {
        return Ok(turns);
    };

    tracing::debug!(%reason, "Repairing conversation alternation");
    let repaired = repair_alternation(messages, pending_prompt);
    validate_alternation(&repaired).map_err(ProviderError::ProtocolViolation)?;
    Ok(repaired)
}
