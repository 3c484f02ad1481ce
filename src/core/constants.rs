//! Shared constants used across the session state manager.

/// Topic assigned to sessions before the summarizer produces a real title.
pub const DEFAULT_TOPIC: &str = "New Conversation";

/// Fallback endpoint when `OPENAI_BASE_URL` and config are both silent.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Number of messages allowed to accumulate past the summarize watermark
/// before a summarization pass is even considered.
pub const SUMMARIZE_PADDING_MESSAGES: usize = 4;

/// Fraction of the model's token budget the unsummarized tail must reach
/// before a summarization pass runs.
pub const SUMMARIZE_TOKEN_SHARE: f64 = 0.3;

/// Running summaries are clipped to this many characters (keeping the most
/// recent tail) before being fed back into the summarizer.
pub const MEMORY_PROMPT_LIMIT: usize = 4000;

/// Minimum conversation length, in characters, before a topic refresh is
/// worth a completion call.
pub const TOPIC_MIN_CHARS: usize = 50;

/// Summaries should be deterministic-ish, so they run near zero temperature.
pub const SUMMARIZE_TEMPERATURE: f32 = 0.1;

pub const SUMMARIZE_INSTRUCTION: &str = "Summarize the discussion briefly in 200 words or less \
to use as a prompt for future context.";

pub const TOPIC_INSTRUCTION: &str = "Summarize the topic of the conversation in 10 words or less. \
The summary will be used as a title for the conversation, so do not include punctuation or \
quotation marks.";
