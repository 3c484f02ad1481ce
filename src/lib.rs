//! Parley manages chat session state for streaming LLM clients.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns session state: the session registry, per-turn streaming
//!   coordination, context-window construction, and background
//!   summarization.
//! - [`api`] defines the OpenAI-compatible chat payloads used on the wire.
//! - [`persistence`] is the opaque key-value seam sessions are saved through.
//! - [`cli`] is the thin command surface: one-shot sends plus session and
//!   config management.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod persistence;
pub mod utils;
