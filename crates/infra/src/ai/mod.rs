//! Task suggestion LLM integration

mod client;
mod prompts;
mod types;

pub use client::SuggestionClient;
pub use types::EmailSource;
