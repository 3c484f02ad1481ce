//! Background summarization.
//!
//! After a turn completes, two gated checks decide whether to spend a
//! completion call: folding the unsummarized transcript tail into the
//! session's memory prompt, and refreshing a still-default topic. Jobs are
//! built synchronously from a session snapshot, run on the runtime, and
//! report back over a channel; the store decides whether an outcome is
//! still fresh enough to apply.

use tokio::sync::mpsc;

use crate::api::ChatMessage;
use crate::core::chat_stream::complete_once;
use crate::core::constants::{
    MEMORY_PROMPT_LIMIT, SUMMARIZE_INSTRUCTION, SUMMARIZE_PADDING_MESSAGES, SUMMARIZE_TEMPERATURE,
    SUMMARIZE_TOKEN_SHARE, TOPIC_INSTRUCTION, TOPIC_MIN_CHARS,
};
use crate::core::mask::ModelConfig;
use crate::core::memory::render_memory;
use crate::core::message::Role;
use crate::core::session::Session;
use crate::utils::token::estimate_tokens;

/// Result of a finished summarizer job, ready to be applied to the store.
#[derive(Debug, Clone)]
pub enum SummaryOutcome {
    Memory {
        session_id: String,
        summary: String,
        /// Message count captured when the job was built. The store only
        /// applies the summary if the watermark can still advance there.
        watermark: usize,
    },
    Topic {
        session_id: String,
        topic: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Memory { watermark: usize },
    Topic,
}

/// One completion call the summarizer has decided to make.
pub struct SummarizeJob {
    pub session_id: String,
    pub model: String,
    pub sampling: ModelConfig,
    pub api_messages: Vec<ChatMessage>,
    kind: JobKind,
}

/// Keep the trailing `MEMORY_PROMPT_LIMIT` characters of a summary.
fn clip_memory(prompt: &str) -> &str {
    let total = prompt.chars().count();
    if total <= MEMORY_PROMPT_LIMIT {
        return prompt;
    }
    let skip = total - MEMORY_PROMPT_LIMIT;
    match prompt.char_indices().nth(skip) {
        Some((byte_index, _)) => &prompt[byte_index..],
        None => prompt,
    }
}

fn transcript_message(role: Role, content: &str) -> ChatMessage {
    ChatMessage::new(role.as_str(), content)
}

fn sampling_for(session: &Session) -> ModelConfig {
    let mut sampling = session.mask.model_config.clone();
    sampling.temperature = SUMMARIZE_TEMPERATURE;
    sampling
}

/// Build a memory-compression job, or None while the gate holds it back.
///
/// The gate has three parts: enough messages must have accumulated past the
/// watermark, the unsummarized tail must clear the per-session compression
/// threshold, and it must be worth compressing relative to the model's
/// token budget.
pub fn memory_job(session: &Session) -> Option<SummarizeJob> {
    let config = &session.mask.model_config;
    if session.messages.len() <= session.last_summarize_index + SUMMARIZE_PADDING_MESSAGES {
        return None;
    }

    let tail: Vec<_> = session
        .unsummarized()
        .iter()
        .filter(|m| !m.is_error && !m.streaming)
        .collect();
    let tail_tokens: usize = tail
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum();
    if tail_tokens <= config.compress_message_length_threshold {
        return None;
    }
    if (tail_tokens as f64) < config.max_tokens as f64 * SUMMARIZE_TOKEN_SHARE {
        return None;
    }

    let mut api_messages = Vec::new();
    if config.enable_inject_system_prompts {
        for entry in &session.mask.context {
            api_messages.push(transcript_message(entry.role, &entry.content));
        }
    }
    for message in session.summarized() {
        if message.is_error || message.streaming {
            continue;
        }
        api_messages.push(transcript_message(message.role, &message.content));
    }
    let summary = clip_memory(session.memory_prompt.trim());
    if !summary.is_empty() {
        api_messages.push(render_memory(summary));
    }
    for message in tail {
        api_messages.push(transcript_message(message.role, &message.content));
    }
    api_messages.push(ChatMessage::system(SUMMARIZE_INSTRUCTION));

    Some(SummarizeJob {
        session_id: session.id.clone(),
        model: config.model.clone(),
        sampling: sampling_for(session),
        api_messages,
        kind: JobKind::Memory {
            watermark: session.messages.len(),
        },
    })
}

/// Build a topic-refresh job, or None when the session already has a real
/// topic or is too short to title.
pub fn topic_job(session: &Session) -> Option<SummarizeJob> {
    if !session.has_default_topic() {
        return None;
    }
    let total_chars: usize = session
        .messages
        .iter()
        .filter(|m| !m.is_error && !m.streaming)
        .map(|m| m.content.chars().count())
        .sum();
    if total_chars < TOPIC_MIN_CHARS {
        return None;
    }

    let mut api_messages: Vec<ChatMessage> = session
        .messages
        .iter()
        .filter(|m| !m.is_error && !m.streaming && !m.content.is_empty())
        .map(|m| transcript_message(m.role, &m.content))
        .collect();
    api_messages.push(ChatMessage::system(TOPIC_INSTRUCTION));

    Some(SummarizeJob {
        session_id: session.id.clone(),
        model: session.mask.model_config.model.clone(),
        sampling: sampling_for(session),
        api_messages,
        kind: JobKind::Topic,
    })
}

/// Runs summarizer jobs in the background and streams outcomes back.
pub struct Summarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    summarize_model: Option<String>,
    tx: mpsc::UnboundedSender<SummaryOutcome>,
}

impl Summarizer {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        summarize_model: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<SummaryOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                base_url: base_url.into(),
                api_key: api_key.into(),
                summarize_model,
                tx,
            },
            rx,
        )
    }

    /// Run the gates against a session snapshot and spawn whichever jobs
    /// pass. Returns the number of jobs started.
    pub fn maybe_summarize(&self, session: &Session) -> usize {
        let mut spawned = 0;
        if let Some(job) = topic_job(session) {
            self.spawn_job(job);
            spawned += 1;
        }
        if let Some(job) = memory_job(session) {
            self.spawn_job(job);
            spawned += 1;
        }
        spawned
    }

    fn spawn_job(&self, job: SummarizeJob) {
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();
        let model = self
            .summarize_model
            .clone()
            .unwrap_or_else(|| job.model.clone());
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = complete_once(
                &client,
                &base_url,
                &api_key,
                model,
                &job.sampling,
                job.api_messages,
            )
            .await;

            match result {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        tracing::debug!(session_id = %job.session_id, "summarizer returned empty text");
                        return;
                    }
                    let outcome = match job.kind {
                        JobKind::Memory { watermark } => SummaryOutcome::Memory {
                            session_id: job.session_id,
                            summary: text,
                            watermark,
                        },
                        JobKind::Topic => SummaryOutcome::Topic {
                            session_id: job.session_id,
                            topic: text,
                        },
                    };
                    let _ = tx.send(outcome);
                }
                Err(err) => {
                    tracing::warn!(session_id = %job.session_id, "summarizer call failed: {err}");
                }
            }
        });
    }
}
