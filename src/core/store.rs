//! Process-wide session registry.
//!
//! Owns the ordered session list and the current-session pointer, and keeps
//! two invariants: the list is never empty, and the pointer is always a
//! valid index. Mutation helpers preserve both across create, fork, delete,
//! reorder, and load.

use serde::{Deserialize, Serialize};

use crate::core::mask::{Mask, ModelConfig};
use crate::core::message::Message;
use crate::core::session::Session;
use crate::core::summarize::SummaryOutcome;
use crate::persistence::{KvError, KvStore};

const CHAT_STATE_KEY: &str = "chat-store";
const CHAT_STATE_VERSION: u32 = 1;

/// Persisted shape of the registry.
#[derive(Serialize, Deserialize)]
struct ChatState {
    version: u32,
    sessions: Vec<Session>,
    current_session_index: usize,
    #[serde(default)]
    last_input: String,
}

/// Full registry snapshot taken before a deletion, so the deletion can be
/// reverted wholesale.
pub struct UndoSnapshot {
    sessions: Vec<Session>,
    current_session_index: usize,
}

pub struct SessionStore {
    sessions: Vec<Session>,
    current_session_index: usize,
    last_input: String,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: vec![Session::empty()],
            current_session_index: 0,
            last_input: String::new(),
        }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn current_session_index(&self) -> usize {
        self.current_session_index
    }

    pub fn last_input(&self) -> &str {
        &self.last_input
    }

    pub fn set_last_input(&mut self, input: impl Into<String>) {
        self.last_input = input.into();
    }

    fn clamp_current_index(&mut self) {
        if self.current_session_index >= self.sessions.len() {
            self.current_session_index = self.sessions.len().saturating_sub(1);
        }
    }

    /// The current session, clamping the pointer back into range first.
    pub fn current_session(&mut self) -> &Session {
        self.clamp_current_index();
        &self.sessions[self.current_session_index]
    }

    pub fn current_session_mut(&mut self) -> &mut Session {
        self.clamp_current_index();
        &mut self.sessions[self.current_session_index]
    }

    pub fn session_by_id(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn session_by_id_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    /// Create a session, optionally from a mask, insert it at the front, and
    /// make it current.
    pub fn new_session(&mut self, mask: Option<&Mask>, defaults: &ModelConfig) -> &Session {
        let session = match mask {
            Some(mask) => Session::from_mask(mask, defaults),
            None => {
                let mut session = Session::empty();
                session.mask.model_config = defaults.clone();
                session
            }
        };
        self.sessions.insert(0, session);
        self.current_session_index = 0;
        &self.sessions[0]
    }

    /// Deep-copy the current session, append the copy, and select it.
    pub fn fork_session(&mut self) -> &Session {
        let fork = self.current_session().fork();
        self.sessions.push(fork);
        self.current_session_index = self.sessions.len() - 1;
        &self.sessions[self.current_session_index]
    }

    /// Reset to a single empty session.
    pub fn clear_sessions(&mut self) {
        self.sessions = vec![Session::empty()];
        self.current_session_index = 0;
    }

    pub fn select_session(&mut self, index: usize) {
        if index < self.sessions.len() {
            self.current_session_index = index;
        }
    }

    /// Step the current-session pointer by `delta`, wrapping at both ends.
    pub fn next_session(&mut self, delta: i64) {
        let n = self.sessions.len() as i64;
        let i = self.current_session_index as i64;
        self.current_session_index = (((i + delta) % n + n) % n) as usize;
    }

    /// Reorder the list, keeping the pointer on the session it pointed at.
    pub fn move_session(&mut self, from: usize, to: usize) {
        if from >= self.sessions.len() || to >= self.sessions.len() || from == to {
            return;
        }

        let session = self.sessions.remove(from);
        self.sessions.insert(to, session);

        let current = self.current_session_index;
        let mut new_index = if current == from { to } else { current };
        if current > from && current <= to {
            new_index -= 1;
        } else if current < from && current >= to {
            new_index += 1;
        }
        self.current_session_index = new_index;
    }

    /// Delete the session at `index`. Returns a snapshot of the registry as
    /// it was before the deletion, which `restore` can put back.
    pub fn delete_session(&mut self, index: usize) -> Option<UndoSnapshot> {
        if index >= self.sessions.len() {
            return None;
        }

        let snapshot = UndoSnapshot {
            sessions: self.sessions.clone(),
            current_session_index: self.current_session_index,
        };

        let deleting_last_session = self.sessions.len() == 1;
        self.sessions.remove(index);

        let current = self.current_session_index;
        let mut next_index = current
            .saturating_sub(if index < current { 1 } else { 0 })
            .min(self.sessions.len().saturating_sub(1));

        if deleting_last_session {
            next_index = 0;
            self.sessions.push(Session::empty());
        }

        self.current_session_index = next_index;
        Some(snapshot)
    }

    /// Revert a deletion.
    pub fn restore(&mut self, snapshot: UndoSnapshot) {
        self.sessions = snapshot.sessions;
        self.current_session_index = snapshot.current_session_index;
    }

    /// Append a message to a session, folding its content into the rolling
    /// statistics. Returns false if the session no longer exists.
    pub fn on_new_message(&mut self, session_id: &str, message: Message) -> bool {
        let Some(session) = self.session_by_id_mut(session_id) else {
            return false;
        };
        let content = message.content.clone();
        session.push_message(message);
        session.count_into_stat(&content);
        true
    }

    /// Apply a keyed update to one message. Unknown session or message ids
    /// are a no-op, which is what makes replayed updates safe.
    pub fn update_message<F>(&mut self, session_id: &str, message_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(session) = self.session_by_id_mut(session_id) else {
            return false;
        };
        let Some(message) = session.message_mut(message_id) else {
            return false;
        };
        f(message);
        true
    }

    /// Apply a completed summarizer outcome. Stale outcomes (watermark moved
    /// past the job, transcript reset, session renamed meanwhile) are dropped.
    pub fn apply_summary(&mut self, outcome: SummaryOutcome) -> bool {
        match outcome {
            SummaryOutcome::Memory {
                session_id,
                summary,
                watermark,
            } => {
                let Some(session) = self.session_by_id_mut(&session_id) else {
                    return false;
                };
                if !session.advance_watermark(watermark) {
                    tracing::debug!(session_id, watermark, "dropping stale summary");
                    return false;
                }
                session.memory_prompt = summary;
                true
            }
            SummaryOutcome::Topic { session_id, topic } => {
                let Some(session) = self.session_by_id_mut(&session_id) else {
                    return false;
                };
                if !session.has_default_topic() {
                    return false;
                }
                let topic = topic.trim().trim_matches('"').trim();
                if topic.is_empty() {
                    return false;
                }
                session.topic = topic.to_string();
                true
            }
        }
    }

    /// Load the registry from the key-value store, restoring invariants that
    /// a crash or older writer may have violated.
    pub fn load(kv: &dyn KvStore) -> Result<Self, KvError> {
        let Some(raw) = kv.get(CHAT_STATE_KEY)? else {
            return Ok(Self::new());
        };
        let state: ChatState =
            serde_json::from_str(&raw).map_err(|source| KvError::serde(CHAT_STATE_KEY, source))?;
        Ok(Self::from_state(state))
    }

    fn from_state(state: ChatState) -> Self {
        let mut store = Self {
            sessions: state.sessions,
            current_session_index: state.current_session_index,
            last_input: state.last_input,
        };

        if store.sessions.is_empty() {
            store.sessions.push(Session::empty());
        }
        store.clamp_current_index();

        for session in &mut store.sessions {
            let len = session.messages.len();
            if session.last_summarize_index > len {
                session.last_summarize_index = len;
            }
            // A message stuck in the streaming state means the writer died
            // mid-turn; finalize it so it becomes immutable again.
            for message in &mut session.messages {
                message.streaming = false;
            }
        }

        store
    }

    pub fn save(&self, kv: &mut dyn KvStore) -> Result<(), KvError> {
        let state = ChatState {
            version: CHAT_STATE_VERSION,
            sessions: self.sessions.clone(),
            current_session_index: self.current_session_index,
            last_input: self.last_input.clone(),
        };
        let raw = serde_json::to_string(&state)
            .map_err(|source| KvError::serde(CHAT_STATE_KEY, source))?;
        kv.set(CHAT_STATE_KEY, &raw)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mask::MaskMessage;
    use crate::core::message::Role;
    use crate::persistence::MemoryKv;

    fn store_with_sessions(n: usize) -> SessionStore {
        let mut store = SessionStore::new();
        // new_session inserts at the front, so create n-1 more
        for i in 1..n {
            store.new_session(None, &ModelConfig::default());
            store.current_session_mut().topic = format!("s{i}");
        }
        store
    }

    #[test]
    fn store_starts_with_one_empty_session() {
        let mut store = SessionStore::new();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_session_index(), 0);
        assert!(store.current_session().messages.is_empty());
    }

    #[test]
    fn new_session_goes_to_front_and_becomes_current() {
        let mut store = SessionStore::new();
        let first_id = store.current_session().id.clone();
        let new_id = store.new_session(None, &ModelConfig::default()).id.clone();

        assert_eq!(store.sessions().len(), 2);
        assert_eq!(store.current_session_index(), 0);
        assert_eq!(store.current_session().id, new_id);
        assert_eq!(store.sessions()[1].id, first_id);
    }

    #[test]
    fn new_session_from_mask_copies_context() {
        let mut store = SessionStore::new();
        let mut mask = Mask::empty();
        mask.name = "Tutor".to_string();
        mask.context = vec![MaskMessage {
            role: Role::System,
            content: "teach".to_string(),
        }];

        store.new_session(Some(&mask), &ModelConfig::default());
        assert_eq!(store.current_session().topic, "Tutor");
        assert_eq!(store.current_session().memory_prompt, "teach");
    }

    #[test]
    fn fork_appends_and_selects_copy() {
        let mut store = SessionStore::new();
        store
            .current_session_mut()
            .push_message(Message::user("hi"));
        let original_id = store.current_session().id.clone();

        let fork_id = store.fork_session().id.clone();
        assert_eq!(store.sessions().len(), 2);
        assert_eq!(store.current_session_index(), 1);
        assert_ne!(fork_id, original_id);
        assert_eq!(store.current_session().messages.len(), 1);
    }

    #[test]
    fn next_session_wraps_both_directions() {
        let mut store = store_with_sessions(3);
        store.select_session(0);
        store.next_session(-1);
        assert_eq!(store.current_session_index(), 2);
        store.next_session(1);
        assert_eq!(store.current_session_index(), 0);
        store.next_session(4);
        assert_eq!(store.current_session_index(), 1);
    }

    #[test]
    fn move_session_follows_the_current_session() {
        let mut store = store_with_sessions(4);
        store.select_session(1);
        let tracked = store.current_session().id.clone();

        store.move_session(1, 3);
        assert_eq!(store.current_session_index(), 3);
        assert_eq!(store.current_session().id, tracked);
    }

    #[test]
    fn move_session_shifts_current_when_moving_across_it() {
        let mut store = store_with_sessions(4);
        store.select_session(2);
        let tracked = store.current_session().id.clone();

        // moving 0 -> 3 slides everything between down by one
        store.move_session(0, 3);
        assert_eq!(store.current_session_index(), 1);
        assert_eq!(store.current_session().id, tracked);

        // and back up the other way
        store.move_session(3, 0);
        assert_eq!(store.current_session_index(), 2);
        assert_eq!(store.current_session().id, tracked);
    }

    #[test]
    fn delete_before_current_shifts_the_pointer() {
        let mut store = store_with_sessions(3);
        store.select_session(2);
        let tracked = store.current_session().id.clone();

        store.delete_session(0).unwrap();
        assert_eq!(store.current_session_index(), 1);
        assert_eq!(store.current_session().id, tracked);
    }

    #[test]
    fn deleting_the_only_session_leaves_a_fresh_one() {
        let mut store = SessionStore::new();
        store
            .current_session_mut()
            .push_message(Message::user("hi"));

        store.delete_session(0).unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_session_index(), 0);
        assert!(store.current_session().messages.is_empty());
    }

    #[test]
    fn delete_out_of_range_is_a_no_op() {
        let mut store = store_with_sessions(2);
        assert!(store.delete_session(5).is_none());
        assert_eq!(store.sessions().len(), 2);
    }

    #[test]
    fn restore_reverts_a_deletion() {
        let mut store = store_with_sessions(3);
        store.select_session(1);
        let before: Vec<String> = store.sessions().iter().map(|s| s.id.clone()).collect();

        let snapshot = store.delete_session(1).unwrap();
        assert_eq!(store.sessions().len(), 2);

        store.restore(snapshot);
        let after: Vec<String> = store.sessions().iter().map(|s| s.id.clone()).collect();
        assert_eq!(before, after);
        assert_eq!(store.current_session_index(), 1);
    }

    #[test]
    fn on_new_message_updates_stats() {
        let mut store = SessionStore::new();
        let session_id = store.current_session().id.clone();

        assert!(store.on_new_message(&session_id, Message::user("hello!")));
        let session = store.current_session();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.stat.char_count, 6);
        assert_eq!(session.stat.word_count, 3);
    }

    #[test]
    fn on_new_message_for_unknown_session_is_rejected() {
        let mut store = SessionStore::new();
        assert!(!store.on_new_message("gone", Message::user("hi")));
    }

    #[test]
    fn update_message_is_keyed_and_idempotent_on_misses() {
        let mut store = SessionStore::new();
        let session_id = store.current_session().id.clone();
        let message = Message::user("hi");
        let message_id = message.id.clone();
        store.on_new_message(&session_id, message);

        assert!(store.update_message(&session_id, &message_id, |m| {
            m.content.push_str(" there");
        }));
        assert_eq!(store.current_session().messages[0].content, "hi there");

        assert!(!store.update_message(&session_id, "missing", |m| m.content.clear()));
        assert!(!store.update_message("missing", &message_id, |m| m.content.clear()));
        assert_eq!(store.current_session().messages[0].content, "hi there");
    }

    #[test]
    fn stale_memory_summary_is_dropped() {
        let mut store = SessionStore::new();
        let session_id = store.current_session().id.clone();
        for i in 0..4 {
            store.on_new_message(&session_id, Message::user(format!("m{i}")));
        }
        store.current_session_mut().advance_watermark(4);

        let applied = store.apply_summary(SummaryOutcome::Memory {
            session_id: session_id.clone(),
            summary: "old".to_string(),
            watermark: 2,
        });
        assert!(!applied);
        assert_eq!(store.current_session().last_summarize_index, 4);
        assert!(store.current_session().memory_prompt.is_empty());
    }

    #[test]
    fn fresh_memory_summary_advances_watermark() {
        let mut store = SessionStore::new();
        let session_id = store.current_session().id.clone();
        for i in 0..6 {
            store.on_new_message(&session_id, Message::user(format!("m{i}")));
        }

        let applied = store.apply_summary(SummaryOutcome::Memory {
            session_id: session_id.clone(),
            summary: "the gist".to_string(),
            watermark: 6,
        });
        assert!(applied);
        assert_eq!(store.current_session().memory_prompt, "the gist");
        assert_eq!(store.current_session().last_summarize_index, 6);
    }

    #[test]
    fn topic_outcome_only_lands_on_default_topics() {
        let mut store = SessionStore::new();
        let session_id = store.current_session().id.clone();

        assert!(store.apply_summary(SummaryOutcome::Topic {
            session_id: session_id.clone(),
            topic: "\"Rust lifetimes\"".to_string(),
        }));
        assert_eq!(store.current_session().topic, "Rust lifetimes");

        assert!(!store.apply_summary(SummaryOutcome::Topic {
            session_id,
            topic: "Something else".to_string(),
        }));
        assert_eq!(store.current_session().topic, "Rust lifetimes");
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut kv = MemoryKv::new();
        let mut store = store_with_sessions(3);
        let session_id = store.current_session().id.clone();
        store.on_new_message(&session_id, Message::user("persisted"));
        store.select_session(2);
        store.set_last_input("draft");
        store.save(&mut kv).unwrap();

        let mut loaded = SessionStore::load(&kv).unwrap();
        assert_eq!(loaded.sessions().len(), 3);
        assert_eq!(loaded.current_session_index(), 2);
        assert_eq!(loaded.last_input(), "draft");
        loaded.select_session(0);
        assert_eq!(loaded.current_session().messages[0].content, "persisted");
    }

    #[test]
    fn load_repairs_violated_invariants() {
        let mut kv = MemoryKv::new();
        let mut session = Session::empty();
        let mut streaming = Message::assistant_placeholder("gpt-4o");
        streaming.content = "partial".to_string();
        session.messages.push(streaming);
        session.last_summarize_index = 9;

        let state = ChatState {
            version: CHAT_STATE_VERSION,
            sessions: vec![session],
            current_session_index: 7,
            last_input: String::new(),
        };
        kv.set(CHAT_STATE_KEY, &serde_json::to_string(&state).unwrap())
            .unwrap();

        let mut loaded = SessionStore::load(&kv).unwrap();
        assert_eq!(loaded.current_session_index(), 0);
        let session = loaded.current_session();
        assert_eq!(session.last_summarize_index, 1);
        assert!(session.messages[0].is_finalized());
    }

    #[test]
    fn load_from_empty_kv_yields_fresh_store() {
        let kv = MemoryKv::new();
        let mut store = SessionStore::load(&kv).unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert!(store.current_session().messages.is_empty());
    }
}
