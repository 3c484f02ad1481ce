use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::constants::DEFAULT_TOPIC;
use crate::core::mask::{Mask, ModelConfig};
use crate::core::message::Message;
use crate::utils::id::new_id;
use crate::utils::token::estimate_tokens;

/// Rolling transcript statistics. `word_count` is the `char_count / 2`
/// heuristic carried over from the persisted format, not a real word count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStat {
    pub token_count: usize,
    pub word_count: usize,
    pub char_count: usize,
}

/// One conversation: an ordered transcript plus its running summary.
///
/// A session owns its messages exclusively. `last_summarize_index` is the
/// summarize watermark: everything before it is already folded into
/// `memory_prompt`. The watermark never exceeds `messages.len()` and only
/// moves backward when the transcript itself is cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub memory_prompt: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stat: SessionStat,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub last_summarize_index: usize,
    #[serde(default)]
    pub mask: Mask,
}

impl Session {
    pub fn empty() -> Self {
        Self {
            id: new_id(),
            topic: DEFAULT_TOPIC.to_string(),
            memory_prompt: String::new(),
            messages: Vec::new(),
            stat: SessionStat::default(),
            last_update: Utc::now(),
            last_summarize_index: 0,
            mask: Mask::empty(),
        }
    }

    /// Create a session from a mask. The mask is copied; its model config is
    /// overlaid on the global defaults so unset mask fields inherit them.
    pub fn from_mask(mask: &Mask, defaults: &ModelConfig) -> Self {
        let mut session = Self::empty();
        let mut mask = mask.clone();
        if mask.model_config.model.is_empty() {
            mask.model_config.model = defaults.model.clone();
        }
        session.topic = mask.name.clone();
        session.memory_prompt = mask
            .context
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        session.mask = mask;
        session
    }

    /// Deep copy under a fresh id, used when forking a conversation.
    pub fn fork(&self) -> Self {
        let mut copy = self.clone();
        copy.id = new_id();
        copy.last_update = Utc::now();
        copy
    }

    /// Drop the transcript and summary. The watermark goes back to zero with
    /// the messages so it stays within bounds.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.memory_prompt.clear();
        self.last_summarize_index = 0;
        self.stat = SessionStat::default();
        self.last_update = Utc::now();
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.last_update = Utc::now();
        debug_assert!(self.last_summarize_index <= self.messages.len());
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Messages not yet folded into the running summary.
    pub fn unsummarized(&self) -> &[Message] {
        let start = self.last_summarize_index.min(self.messages.len());
        &self.messages[start..]
    }

    /// Messages already covered by the running summary.
    pub fn summarized(&self) -> &[Message] {
        let end = self.last_summarize_index.min(self.messages.len());
        &self.messages[..end]
    }

    /// Advance the summarize watermark. Returns false (and leaves the
    /// watermark alone) if the target would move it backward or past the end
    /// of the transcript; stale summarizer outcomes land here.
    pub fn advance_watermark(&mut self, to: usize) -> bool {
        if to < self.last_summarize_index || to > self.messages.len() {
            return false;
        }
        self.last_summarize_index = to;
        true
    }

    /// Fold one message's content into the rolling statistics.
    pub fn count_into_stat(&mut self, content: &str) {
        self.stat.char_count += content.chars().count();
        self.stat.word_count = self.stat.char_count / 2;
        self.stat.token_count += estimate_tokens(content);
    }

    pub fn has_default_topic(&self) -> bool {
        self.topic == DEFAULT_TOPIC
    }
}
