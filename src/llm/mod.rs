//! LLM client for metadata extraction, summaries, and page description.

mod client;

pub use client::{LlmClient, LlmConfig, LlmError};
