//! LLM provider client and prompt resolution for portrait generation.

pub mod client;
pub mod prompt;

pub use client::{extract_json_text, extract_message_content, ChatClient};
pub use prompt::{resolve_prompt, PromptSpec};
