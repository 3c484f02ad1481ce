//! Context-window construction ("memory").
//!
//! Derives the exact message list sent to the provider for a turn: injected
//! mask context, then the running summary as a system message, then recent
//! transcript messages filtered by count and age. The caller appends the
//! user turn being sent.

use chrono::{Duration, Utc};

use crate::api::ChatMessage;
use crate::core::message::Role;
use crate::core::session::Session;

/// Render a summary as the system message that carries it to the provider.
pub fn render_memory(summary: &str) -> ChatMessage {
    ChatMessage::system(format!(
        "This is a summary of the chat history as a memory prompt:\n{summary}"
    ))
}

/// Render the running summary as a system message, or None when the session
/// has no summary or opted out of sending memory.
pub fn memory_prompt_message(session: &Session) -> Option<ChatMessage> {
    if !session.mask.model_config.send_memory {
        return None;
    }
    let summary = session.memory_prompt.trim();
    if summary.is_empty() {
        return None;
    }
    Some(render_memory(summary))
}

/// Build the provider payload for the next turn of `session`.
///
/// Recent messages are limited to the trailing `history_message_count` and
/// additionally dropped once older than that many days. Error turns and
/// still-streaming placeholders never reach the provider.
pub fn build_context(session: &Session) -> Vec<ChatMessage> {
    let config = &session.mask.model_config;
    let mut payload = Vec::new();

    if config.enable_inject_system_prompts {
        for entry in &session.mask.context {
            payload.push(ChatMessage::new(entry.role.as_str(), entry.content.clone()));
        }
    }

    if let Some(memory) = memory_prompt_message(session) {
        payload.push(memory);
    }

    let limit = config.history_message_count;
    let cutoff = Utc::now() - Duration::days(limit as i64);
    let start = session.messages.len().saturating_sub(limit);

    for message in &session.messages[start..] {
        if message.streaming || message.is_error {
            continue;
        }
        if message.date < cutoff {
            continue;
        }
        match message.role {
            Role::User | Role::Assistant => {
                if message.content.is_empty() {
                    continue;
                }
                payload.push(ChatMessage::new(
                    message.role.as_str(),
                    message.content.clone(),
                ));
            }
            // Transcript-level system notes are app-internal.
            Role::System => continue,
        }
    }

    payload
}
