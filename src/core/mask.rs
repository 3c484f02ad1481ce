//! Masks: named presets bundling default system context and model settings.
//!
//! A mask is copied, never referenced, into a session at creation time, so
//! later edits to the mask list leave existing sessions untouched.

use serde::{Deserialize, Serialize};

use crate::core::config::Config;
use crate::core::constants::DEFAULT_TOPIC;
use crate::core::message::Role;
use crate::utils::id::new_id;

/// Per-session model settings. Stored inside the mask and therefore copied
/// into every session created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Include the running summary as a system message when building context.
    pub send_memory: bool,
    /// How many trailing messages to send, and the age cutoff in days.
    pub history_message_count: usize,
    /// Unsummarized history shorter than this is not worth a compression
    /// call.
    pub compress_message_length_threshold: usize,
    /// Inject the mask context as leading system messages.
    pub enable_inject_system_prompts: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 4096,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            send_memory: true,
            history_message_count: 16,
            compress_message_length_threshold: 1000,
            enable_inject_system_prompts: true,
        }
    }
}

/// A canned context entry carried by a mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub context: Vec<MaskMessage>,
    #[serde(default)]
    pub model_config: ModelConfig,
}

impl Mask {
    /// The mask a session gets when none was chosen.
    pub fn empty() -> Self {
        Self {
            id: new_id(),
            name: DEFAULT_TOPIC.to_string(),
            context: Vec::new(),
            model_config: ModelConfig::default(),
        }
    }
}

impl Default for Mask {
    fn default() -> Self {
        Self::empty()
    }
}

/// Manages the mask list loaded from configuration.
pub struct MaskManager {
    masks: Vec<Mask>,
    default_mask: Option<String>,
}

impl MaskManager {
    pub fn load(config: &Config) -> Self {
        Self {
            masks: config.masks.clone(),
            default_mask: config.default_mask.clone(),
        }
    }

    pub fn list(&self) -> &[Mask] {
        &self.masks
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Mask> {
        self.masks.iter().find(|mask| mask.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Mask> {
        self.masks
            .iter()
            .find(|mask| mask.name.eq_ignore_ascii_case(name))
    }

    /// Resolve the mask for a new session: explicit choice first, then the
    /// configured default, then none.
    pub fn resolve(&self, requested: Option<&str>) -> Result<Option<&Mask>, String> {
        if let Some(wanted) = requested {
            return match self.find_by_id(wanted).or_else(|| self.find_by_name(wanted)) {
                Some(mask) => Ok(Some(mask)),
                None => {
                    let available: Vec<&str> =
                        self.masks.iter().map(|mask| mask.name.as_str()).collect();
                    Err(format!(
                        "Mask '{}' not found. Available masks: {}",
                        wanted,
                        available.join(", ")
                    ))
                }
            };
        }

        Ok(self
            .default_mask
            .as_deref()
            .and_then(|id| self.find_by_id(id).or_else(|| self.find_by_name(id))))
    }
}
