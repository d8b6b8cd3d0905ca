//! Provider-agnostic LLM interface and the per-backend adapters.
//!
//! [`LlmClient`] is the single surface callers program against; the
//! [`factory`] builds the right adapter from [`LlmSettings`]. Adapters
//! fall into two transport families: HTTP APIs (Ollama, OpenAI,
//! Anthropic, Gemini, Bedrock) and local CLI agents driven over
//! stdin/stdout NDJSON (Claude Code, Codex).
//!
//! [`LlmSettings`]: crate::config::LlmSettings

pub mod anthropic;
pub mod bedrock;
pub mod claude_code;
mod cli;
pub mod client;
pub mod codex;
pub mod credentials;
pub mod factory;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod sigv4;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use anthropic::AnthropicClient;
pub use bedrock::BedrockClient;
pub use claude_code::ClaudeCodeClient;
pub use client::LlmClient;
pub use codex::CodexClient;
pub use factory::create_client;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use types::{Completion, LlmError, StreamEvent, StreamSink};

use crate::chat::ChatMessage;
use serde_json::{Value, json};

/// `{role, content}` message array shared by the OpenAI-compatible chat
/// endpoints: full history followed by the new user message (skipped
/// when empty).
pub(crate) fn openai_style_messages(history: &[ChatMessage], new_message: &str) -> Vec<Value> {
    let mut messages: Vec<Value> = history
        .iter()
        .map(|msg| {
            json!({
                "role": msg.role().api_value(),
                "content": msg.full_content(),
            })
        })
        .collect();
    if !new_message.is_empty() {
        messages.push(json!({"role": "user", "content": new_message}));
    }
    messages
}
