//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod send;
pub mod session_list;

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::cli::send::run_send;
use crate::cli::session_list::list_sessions;
use crate::core::config::Config;
use crate::core::mask::MaskManager;
use crate::core::store::SessionStore;
use crate::persistence::DirKv;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Session state manager for streaming LLM chat")]
#[command(
    long_about = "Parley keeps persistent chat sessions for OpenAI-compatible APIs: it streams \
responses into the current session, builds the context window from recent history plus a \
running summary, and compresses old turns in the background.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your API key (required)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for this run, overriding the session's model
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt as the next turn of the current session (default)
    Send {
        /// Prompt text (multiple words are joined)
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List saved sessions
    Sessions,
    /// Start a new session, optionally from a mask
    New {
        /// Mask id or name to apply
        mask: Option<String>,
    },
    /// Switch the current session
    Pick {
        /// Session index as shown by `parley sessions`
        index: usize,
    },
    /// Delete a session
    Delete {
        /// Session index as shown by `parley sessions`
        index: usize,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Option<Vec<String>>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(async_main())
}

fn open_data_dir() -> Result<DirKv, Box<dyn Error>> {
    DirKv::default_data_dir().ok_or_else(|| "Failed to determine data directory".into())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Send { prompt: Vec::new() }) {
        Commands::Send { prompt } => run_send(prompt, args.model).await,
        Commands::Sessions => {
            let kv = open_data_dir()?;
            let store = SessionStore::load(&kv)?;
            list_sessions(&store);
            Ok(())
        }
        Commands::New { mask } => {
            let config = Config::load()?;
            let mut kv = open_data_dir()?;
            let mut store = SessionStore::load(&kv)?;

            let manager = MaskManager::load(&config);
            let mask = match manager.resolve(mask.as_deref()) {
                Ok(mask) => mask,
                Err(message) => {
                    eprintln!("❌ {message}");
                    std::process::exit(1);
                }
            };

            let session = store.new_session(mask, &config.resolved_model_defaults());
            println!("✅ Started session: {}", session.topic);
            store.save(&mut kv)?;
            Ok(())
        }
        Commands::Pick { index } => {
            let mut kv = open_data_dir()?;
            let mut store = SessionStore::load(&kv)?;
            if index >= store.sessions().len() {
                eprintln!(
                    "❌ No session at index {index} ({} sessions)",
                    store.sessions().len()
                );
                std::process::exit(1);
            }
            store.select_session(index);
            println!("✅ Current session: {}", store.current_session().topic);
            store.save(&mut kv)?;
            Ok(())
        }
        Commands::Delete { index } => {
            let mut kv = open_data_dir()?;
            let mut store = SessionStore::load(&kv)?;
            let Some(topic) = store.sessions().get(index).map(|s| s.topic.clone()) else {
                eprintln!(
                    "❌ No session at index {index} ({} sessions)",
                    store.sessions().len()
                );
                std::process::exit(1);
            };
            store.delete_session(index);
            println!("✅ Deleted session: {topic}");
            store.save(&mut kv)?;
            Ok(())
        }
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let value = value.map(|v| v.join(" ")).filter(|v| !v.is_empty());
            let Some(value) = value else {
                config.print_all();
                return Ok(());
            };
            match key.as_str() {
                "default-model" => {
                    config.default_model = Some(value.clone());
                    config.save()?;
                    println!("✅ Set default-model to: {value}");
                }
                "base-url" => {
                    config.base_url = Some(value.clone());
                    config.save()?;
                    println!("✅ Set base-url to: {value}");
                }
                "summarize-model" => {
                    config.summarize_model = Some(value.clone());
                    config.save()?;
                    println!("✅ Set summarize-model to: {value}");
                }
                "default-mask" => {
                    config.default_mask = Some(value.clone());
                    config.save()?;
                    println!("✅ Set default-mask to: {value}");
                }
                _ => {
                    eprintln!("❌ Unknown config key: {key}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            match key.as_str() {
                "default-model" => config.default_model = None,
                "base-url" => config.base_url = None,
                "summarize-model" => config.summarize_model = None,
                "default-mask" => config.default_mask = None,
                _ => {
                    eprintln!("❌ Unknown config key: {key}");
                    std::process::exit(1);
                }
            }
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}
