use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::mask::{Mask, ModelConfig};

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    /// Model used when a mask does not name one.
    pub default_model: Option<String>,
    /// OpenAI-compatible endpoint; `OPENAI_BASE_URL` overrides it.
    pub base_url: Option<String>,
    /// Cheaper model for background summarization, if set.
    pub summarize_model: Option<String>,
    /// Mask applied to new sessions when none is requested.
    pub default_mask: Option<String>,
    /// Model settings for sessions created without a mask.
    pub model_defaults: ModelConfig,
    /// User-defined masks for session creation.
    pub masks: Vec<Mask>,
}

impl Config {
    /// Model defaults with `default_model` folded in, ready to seed a new
    /// session.
    pub fn resolved_model_defaults(&self) -> ModelConfig {
        let mut defaults = self.model_defaults.clone();
        if defaults.model.is_empty() {
            if let Some(model) = &self.default_model {
                defaults.model = model.clone();
            }
        }
        defaults
    }

    pub fn print_all(&self) {
        println!("Configuration ({})", path_display(Self::get_config_path()));
        println!(
            "  default-model: {}",
            self.default_model.as_deref().unwrap_or("(unset)")
        );
        println!(
            "  base-url: {}",
            self.base_url.as_deref().unwrap_or("(unset)")
        );
        println!(
            "  summarize-model: {}",
            self.summarize_model.as_deref().unwrap_or("(unset)")
        );
        println!(
            "  default-mask: {}",
            self.default_mask.as_deref().unwrap_or("(unset)")
        );
        println!("  masks: {}", self.masks.len());
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mask::MaskMessage;
    use crate::core::message::Role;

    #[test]
    fn empty_file_parses_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.default_model.is_none());
        assert!(config.masks.is_empty());
        assert_eq!(config.model_defaults, ModelConfig::default());
    }

    #[test]
    fn masks_round_trip_through_toml() {
        let mut config = Config::default();
        config.default_model = Some("gpt-4o-mini".to_string());
        config.masks.push(Mask {
            id: "m1".to_string(),
            name: "Rust Tutor".to_string(),
            context: vec![MaskMessage {
                role: Role::System,
                content: "You teach Rust.".to_string(),
            }],
            model_config: ModelConfig::default(),
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.default_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(parsed.masks.len(), 1);
        assert_eq!(parsed.masks[0].context[0].content, "You teach Rust.");
    }

    #[test]
    fn resolved_defaults_fill_in_the_default_model() {
        let mut config = Config::default();
        config.default_model = Some("gpt-4o".to_string());
        assert_eq!(config.resolved_model_defaults().model, "gpt-4o");

        config.model_defaults.model = "local-llama".to_string();
        assert_eq!(config.resolved_model_defaults().model, "local-llama");
    }
}
