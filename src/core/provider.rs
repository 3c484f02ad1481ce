//! Provider endpoint and credential resolution.
//!
//! Credentials come from the environment only. The base URL falls back from
//! `OPENAI_BASE_URL` to the config file to the stock OpenAI endpoint.

use std::env;
use std::error::Error as StdError;
use std::fmt;

use crate::core::config::Config;
use crate::core::constants::DEFAULT_BASE_URL;

/// Resolved endpoint for one run.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug)]
pub enum ProviderError {
    MissingApiKey,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::MissingApiKey => {
                write!(f, "No API key found. Set the OPENAI_API_KEY environment variable.")
            }
        }
    }
}

impl StdError for ProviderError {}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn session_from_parts(
    api_key: Option<String>,
    base_url: Option<String>,
    config: &Config,
) -> Result<ProviderSession, ProviderError> {
    let api_key = non_empty(api_key).ok_or(ProviderError::MissingApiKey)?;
    let base_url = non_empty(base_url)
        .or_else(|| non_empty(config.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    Ok(ProviderSession { api_key, base_url })
}

/// Resolve the provider session from the environment and config.
pub fn resolve_env_session(config: &Config) -> Result<ProviderSession, ProviderError> {
    session_from_parts(
        env::var("OPENAI_API_KEY").ok(),
        env::var("OPENAI_BASE_URL").ok(),
        config,
    )
}
