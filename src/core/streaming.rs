//! Per-turn streaming coordination.
//!
//! A turn is: one user message, one assistant placeholder, and one provider
//! stream feeding that placeholder. The coordinator owns the mapping from
//! stream ids to turns, reconciles stream events into the session store,
//! and routes cancellation through the controller pool. Events for a stream
//! id it no longer knows are dropped, which makes replays and late
//! deliveries harmless.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::api::ChatMessage;
use crate::core::chat_stream::StreamMessage;
use crate::core::controller::ControllerPool;
use crate::core::mask::ModelConfig;
use crate::core::memory::build_context;
use crate::core::message::Message;
use crate::core::store::SessionStore;

#[derive(Debug, PartialEq, Eq)]
pub enum TurnError {
    /// Whitespace-only input never reaches the provider.
    EmptyInput,
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::EmptyInput => write!(f, "Cannot send an empty message"),
        }
    }
}

impl StdError for TurnError {}

/// Everything the stream service needs to run one turn.
#[derive(Debug)]
pub struct PreparedTurn {
    pub stream_id: u64,
    pub session_id: String,
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub model: String,
    pub sampling: ModelConfig,
    pub cancel_token: CancellationToken,
    pub api_messages: Vec<ChatMessage>,
}

struct ActiveTurn {
    session_id: String,
    user_message_id: String,
    assistant_message_id: String,
}

/// What applying a stream event did to the store.
#[derive(Debug, PartialEq, Eq)]
pub enum Applied {
    /// Content was appended to the streaming assistant message.
    Appended,
    /// A tool-call fragment was merged.
    ToolCallMerged,
    /// The turn completed; stats were updated and the summarizer gate
    /// should run for this session.
    Finished { session_id: String },
    /// The turn failed; both turn messages carry the error flag.
    Failed { session_id: String },
    /// Stale stream id, cancelled turn, or vanished session.
    Ignored,
}

#[derive(Default)]
pub struct StreamingCoordinator {
    pool: ControllerPool,
    active: HashMap<u64, ActiveTurn>,
    next_stream_id: u64,
}

impl StreamingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_active_turns(&self) -> bool {
        !self.active.is_empty()
    }

    /// Start a turn on the current session: push the user message and an
    /// assistant placeholder, build the provider payload, and register a
    /// cancellation token.
    pub fn begin_turn(
        &mut self,
        store: &mut SessionStore,
        content: &str,
    ) -> Result<PreparedTurn, TurnError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let session = store.current_session_mut();
        let session_id = session.id.clone();
        let sampling = session.mask.model_config.clone();
        let model = sampling.model.clone();

        // Context is assembled before this turn's messages join the
        // transcript, then the user turn rides at the end of the payload.
        let mut api_messages = build_context(session);
        api_messages.push(ChatMessage::new("user", content));

        let user_message = Message::user(content);
        let user_message_id = user_message.id.clone();
        let assistant_message = Message::assistant_placeholder(model.clone());
        let assistant_message_id = assistant_message.id.clone();

        store.on_new_message(&session_id, user_message);
        store.on_new_message(&session_id, assistant_message);
        store.set_last_input(content);

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        let cancel_token = self.pool.add(&session_id, &assistant_message_id);
        self.active.insert(
            stream_id,
            ActiveTurn {
                session_id: session_id.clone(),
                user_message_id: user_message_id.clone(),
                assistant_message_id: assistant_message_id.clone(),
            },
        );

        Ok(PreparedTurn {
            stream_id,
            session_id,
            user_message_id,
            assistant_message_id,
            model,
            sampling,
            cancel_token,
            api_messages,
        })
    }

    /// Reconcile one stream event into the session store.
    pub fn apply(
        &mut self,
        store: &mut SessionStore,
        message: StreamMessage,
        stream_id: u64,
    ) -> Applied {
        let Some(turn) = self.active.get(&stream_id) else {
            return Applied::Ignored;
        };
        let session_id = turn.session_id.clone();
        let user_message_id = turn.user_message_id.clone();
        let assistant_message_id = turn.assistant_message_id.clone();

        match message {
            StreamMessage::Chunk(content) => {
                let updated = store.update_message(&session_id, &assistant_message_id, |m| {
                    m.content.push_str(&content);
                });
                if updated {
                    Applied::Appended
                } else {
                    // The session (or the placeholder) is gone; stop tracking.
                    self.drop_turn(stream_id);
                    Applied::Ignored
                }
            }
            StreamMessage::ToolCall(delta) => {
                let updated = store.update_message(&session_id, &assistant_message_id, |m| {
                    m.merge_tool_call(
                        delta.index,
                        delta.id.as_deref(),
                        delta.name.as_deref(),
                        delta.arguments.as_deref(),
                    );
                });
                if updated {
                    Applied::ToolCallMerged
                } else {
                    self.drop_turn(stream_id);
                    Applied::Ignored
                }
            }
            StreamMessage::End => {
                self.active.remove(&stream_id);
                self.pool.remove(&session_id, &assistant_message_id);

                let mut final_content = None;
                let updated = store.update_message(&session_id, &assistant_message_id, |m| {
                    m.streaming = false;
                    final_content = Some(m.content.clone());
                });
                if !updated {
                    return Applied::Ignored;
                }
                if let (Some(content), Some(session)) =
                    (final_content, store.session_by_id_mut(&session_id))
                {
                    session.count_into_stat(&content);
                }
                Applied::Finished { session_id }
            }
            StreamMessage::Error(text) => {
                self.active.remove(&stream_id);
                self.pool.remove(&session_id, &assistant_message_id);

                store.update_message(&session_id, &assistant_message_id, |m| {
                    if !m.content.is_empty() {
                        m.content.push_str("\n\n");
                    }
                    m.content.push_str(&text);
                    m.streaming = false;
                    m.is_error = true;
                });
                store.update_message(&session_id, &user_message_id, |m| {
                    m.is_error = true;
                });
                Applied::Failed { session_id }
            }
        }
    }

    /// Cooperatively cancel one turn. The placeholder keeps whatever content
    /// already arrived and is finalized without an error flag.
    pub fn cancel_turn(&mut self, store: &mut SessionStore, stream_id: u64) {
        let Some(turn) = self.active.remove(&stream_id) else {
            return;
        };
        self.pool.stop(&turn.session_id, &turn.assistant_message_id);

        let mut partial_content = None;
        store.update_message(&turn.session_id, &turn.assistant_message_id, |m| {
            m.streaming = false;
            partial_content = Some(m.content.clone());
        });
        if let (Some(content), Some(session)) =
            (partial_content, store.session_by_id_mut(&turn.session_id))
        {
            session.count_into_stat(&content);
        }
    }

    /// Cancel every in-flight turn.
    pub fn cancel_all(&mut self, store: &mut SessionStore) {
        let stream_ids: Vec<u64> = self.active.keys().copied().collect();
        for stream_id in stream_ids {
            self.cancel_turn(store, stream_id);
        }
    }

    fn drop_turn(&mut self, stream_id: u64) {
        if let Some(turn) = self.active.remove(&stream_id) {
            self.pool.stop(&turn.session_id, &turn.assistant_message_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::ToolCallDelta;
    use crate::core::mask::ModelConfig;

    fn fixture() -> (StreamingCoordinator, SessionStore) {
        let mut store = SessionStore::new();
        store.current_session_mut().mask.model_config = ModelConfig {
            model: "gpt-4o".to_string(),
            ..ModelConfig::default()
        };
        (StreamingCoordinator::new(), store)
    }

    #[test]
    fn begin_turn_rejects_empty_input() {
        let (mut coordinator, mut store) = fixture();
        assert_eq!(
            coordinator.begin_turn(&mut store, "   ").unwrap_err(),
            TurnError::EmptyInput
        );
        assert!(store.current_session().messages.is_empty());
    }

    #[test]
    fn begin_turn_pushes_user_and_placeholder() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hello").unwrap();

        let session = store.current_session();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "hello");
        assert!(session.messages[1].streaming);
        assert_eq!(session.messages[1].model.as_deref(), Some("gpt-4o"));

        // payload is prior context plus the user turn, not the placeholder
        assert_eq!(turn.api_messages.len(), 1);
        assert_eq!(turn.api_messages[0].content, "hello");
        assert_eq!(turn.model, "gpt-4o");
        assert!(coordinator.has_active_turns());
    }

    #[test]
    fn payload_excludes_this_turns_transcript_entries() {
        let (mut coordinator, mut store) = fixture();
        let first = coordinator.begin_turn(&mut store, "one").unwrap();
        coordinator.apply(&mut store, StreamMessage::Chunk("ack".into()), first.stream_id);
        coordinator.apply(&mut store, StreamMessage::End, first.stream_id);

        let second = coordinator.begin_turn(&mut store, "two").unwrap();
        let contents: Vec<&str> = second
            .api_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "ack", "two"]);
    }

    #[test]
    fn chunks_append_in_order() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();

        for part in ["Hel", "lo ", "there"] {
            let applied = coordinator.apply(
                &mut store,
                StreamMessage::Chunk(part.to_string()),
                turn.stream_id,
            );
            assert_eq!(applied, Applied::Appended);
        }

        assert_eq!(store.current_session().messages[1].content, "Hello there");
        assert!(store.current_session().messages[1].streaming);
    }

    #[test]
    fn end_finalizes_and_counts_stats() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();
        let chars_after_user = store.current_session().stat.char_count;

        coordinator.apply(
            &mut store,
            StreamMessage::Chunk("answer".to_string()),
            turn.stream_id,
        );
        let applied = coordinator.apply(&mut store, StreamMessage::End, turn.stream_id);

        assert_eq!(
            applied,
            Applied::Finished {
                session_id: turn.session_id.clone()
            }
        );
        let session = store.current_session();
        assert!(session.messages[1].is_finalized());
        assert_eq!(session.stat.char_count, chars_after_user + "answer".len());
        assert!(!coordinator.has_active_turns());
    }

    #[test]
    fn stale_stream_ids_are_ignored() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();
        coordinator.apply(&mut store, StreamMessage::End, turn.stream_id);

        let applied = coordinator.apply(
            &mut store,
            StreamMessage::Chunk("late delivery".to_string()),
            turn.stream_id,
        );
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(store.current_session().messages[1].content, "");
    }

    #[test]
    fn double_end_is_idempotent() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();
        coordinator.apply(&mut store, StreamMessage::End, turn.stream_id);
        let applied = coordinator.apply(&mut store, StreamMessage::End, turn.stream_id);
        assert_eq!(applied, Applied::Ignored);
    }

    #[test]
    fn errors_mark_both_turn_messages() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();
        coordinator.apply(
            &mut store,
            StreamMessage::Chunk("partial".to_string()),
            turn.stream_id,
        );

        let applied = coordinator.apply(
            &mut store,
            StreamMessage::Error("API Error: overloaded".to_string()),
            turn.stream_id,
        );
        assert_eq!(
            applied,
            Applied::Failed {
                session_id: turn.session_id.clone()
            }
        );

        let session = store.current_session();
        assert!(session.messages[0].is_error, "user message flagged");
        assert!(session.messages[1].is_error, "assistant message flagged");
        assert!(session.messages[1].is_finalized());
        assert_eq!(
            session.messages[1].content,
            "partial\n\nAPI Error: overloaded"
        );
    }

    #[test]
    fn cancel_keeps_partial_content_without_error_flag() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();
        coordinator.apply(
            &mut store,
            StreamMessage::Chunk("partial".to_string()),
            turn.stream_id,
        );

        coordinator.cancel_turn(&mut store, turn.stream_id);
        assert!(turn.cancel_token.is_cancelled());

        let session = store.current_session();
        assert_eq!(session.messages[1].content, "partial");
        assert!(session.messages[1].is_finalized());
        assert!(!session.messages[1].is_error);

        // events after cancellation are dropped
        let applied = coordinator.apply(
            &mut store,
            StreamMessage::Chunk("more".to_string()),
            turn.stream_id,
        );
        assert_eq!(applied, Applied::Ignored);
    }

    #[test]
    fn tool_call_fragments_merge_into_the_placeholder() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();

        let first = ToolCallDelta {
            index: 0,
            id: Some("call_1".to_string()),
            name: Some("search".to_string()),
            arguments: Some("{\"q\":".to_string()),
        };
        let second = ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some("\"rust\"}".to_string()),
        };
        assert_eq!(
            coordinator.apply(&mut store, StreamMessage::ToolCall(first), turn.stream_id),
            Applied::ToolCallMerged
        );
        assert_eq!(
            coordinator.apply(&mut store, StreamMessage::ToolCall(second), turn.stream_id),
            Applied::ToolCallMerged
        );

        let tools = &store.current_session().messages[1].tools;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search");
        assert_eq!(tools[0].arguments, "{\"q\":\"rust\"}");
    }

    #[test]
    fn events_for_a_deleted_session_stop_the_turn() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();

        store.delete_session(0);
        let applied = coordinator.apply(
            &mut store,
            StreamMessage::Chunk("orphan".to_string()),
            turn.stream_id,
        );
        assert_eq!(applied, Applied::Ignored);
        assert!(!coordinator.has_active_turns());
        assert!(turn.cancel_token.is_cancelled());
    }

    #[test]
    fn end_for_a_deleted_session_is_ignored() {
        let (mut coordinator, mut store) = fixture();
        let turn = coordinator.begin_turn(&mut store, "hi").unwrap();

        store.delete_session(0);
        let applied = coordinator.apply(&mut store, StreamMessage::End, turn.stream_id);
        assert_eq!(applied, Applied::Ignored);
        assert!(!coordinator.has_active_turns());
    }

    #[test]
    fn cancel_all_clears_every_turn() {
        let (mut coordinator, mut store) = fixture();
        let first = coordinator.begin_turn(&mut store, "one").unwrap();
        store.new_session(None, &ModelConfig::default());
        let second = coordinator.begin_turn(&mut store, "two").unwrap();

        coordinator.cancel_all(&mut store);
        assert!(first.cancel_token.is_cancelled());
        assert!(second.cancel_token.is_cancelled());
        assert!(!coordinator.has_active_turns());
    }
}
