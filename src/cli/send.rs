//! TUI-less "send" command: one streamed turn of the current session.

use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::config::Config;
use crate::core::provider::resolve_env_session;
use crate::core::store::SessionStore;
use crate::core::streaming::{Applied, StreamingCoordinator};
use crate::core::summarize::Summarizer;
use crate::persistence::DirKv;

const SUMMARIZE_WAIT: Duration = Duration::from_secs(60);

pub async fn run_send(prompt: Vec<String>, model: Option<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: parley send <prompt>");
        std::process::exit(1);
    }

    let config = Config::load()?;
    let provider = match resolve_env_session(&config) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    let mut kv = DirKv::default_data_dir().ok_or("Failed to determine data directory")?;
    let mut store = SessionStore::load(&kv)?;

    {
        let defaults = config.resolved_model_defaults();
        let session = store.current_session_mut();
        if let Some(model) = model {
            session.mask.model_config.model = model;
        } else if session.mask.model_config.model.is_empty() {
            session.mask.model_config.model = defaults.model;
        }
        if session.mask.model_config.model.is_empty() {
            eprintln!("❌ No model configured. Set one with: parley set default-model <model>");
            std::process::exit(1);
        }
    }

    let mut coordinator = StreamingCoordinator::new();
    let turn = coordinator.begin_turn(&mut store, &prompt)?;
    let session_id = turn.session_id.clone();

    let client = reqwest::Client::new();
    let (stream_service, mut rx) = ChatStreamService::new();
    stream_service.spawn_stream(StreamParams {
        client: client.clone(),
        base_url: provider.base_url.clone(),
        api_key: provider.api_key.clone(),
        model: turn.model.clone(),
        sampling: turn.sampling.clone(),
        api_messages: turn.api_messages.clone(),
        cancel_token: turn.cancel_token.clone(),
        stream_id: turn.stream_id,
    });

    let mut failed = false;
    loop {
        let Some((message, stream_id)) = rx.recv().await else {
            break;
        };
        if let StreamMessage::Chunk(content) = &message {
            print!("{content}");
            io::stdout().flush()?;
        }
        match coordinator.apply(&mut store, message, stream_id) {
            Applied::Finished { .. } => {
                println!();
                break;
            }
            Applied::Failed { .. } => {
                failed = true;
                break;
            }
            _ => {}
        }
    }

    if failed {
        if let Some(session) = store.session_by_id(&session_id) {
            if let Some(message) = session.messages.last() {
                eprintln!("\n{}", message.content);
            }
        }
        store.save(&mut kv)?;
        std::process::exit(1);
    }

    run_summaries(&client, &provider.base_url, &provider.api_key, &config, &mut store, &session_id)
        .await;

    store.save(&mut kv)?;
    Ok(())
}

/// Run the summarizer gates for the session that just finished a turn and
/// wait (bounded) for the spawned jobs so their outcomes land before we
/// persist and exit.
async fn run_summaries(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    config: &Config,
    store: &mut SessionStore,
    session_id: &str,
) {
    let (summarizer, mut outcomes) = Summarizer::new(
        client.clone(),
        base_url,
        api_key,
        config.summarize_model.clone(),
    );

    let spawned = match store.session_by_id(session_id) {
        Some(session) => summarizer.maybe_summarize(session),
        None => 0,
    };
    drop(summarizer);

    let mut received = 0;
    while received < spawned {
        match tokio::time::timeout(SUMMARIZE_WAIT, outcomes.recv()).await {
            Ok(Some(outcome)) => {
                store.apply_summary(outcome);
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!("timed out waiting for summarizer");
                break;
            }
        }
    }
}
