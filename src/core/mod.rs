pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod controller;
pub mod mask;
pub mod memory;
pub mod message;
pub mod provider;
pub mod session;
pub mod store;
pub mod streaming;
pub mod summarize;
