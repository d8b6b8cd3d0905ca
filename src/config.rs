//! Backend selection and per-backend configuration.
//!
//! Settings are plain data: the host persists them however it likes and
//! hands an immutable snapshot to the factory. Model identifiers are not
//! validated against any provider catalog; an invalid model surfaces as a
//! backend-reported error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::llm::credentials;

/// Closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Ollama,
    OpenAi,
    Anthropic,
    Gemini,
    Bedrock,
    ClaudeCode,
    Codex,
}

impl Provider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama",
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic Claude",
            Provider::Gemini => "Google Gemini",
            Provider::Bedrock => "AWS Bedrock",
            Provider::ClaudeCode => "Claude Code",
            Provider::Codex => "OpenAI Codex",
        }
    }

    pub const ALL: &'static [Provider] = &[
        Provider::Ollama,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Gemini,
        Provider::Bedrock,
        Provider::ClaudeCode,
        Provider::Codex,
    ];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Bedrock model identifiers offered in the settings UI (global
/// Anthropic inference profiles).
pub const BEDROCK_MODELS: &[&str] = &[
    "global.anthropic.claude-sonnet-4-5-20250929-v1:0",
    "global.anthropic.claude-sonnet-4-20250514-v1:0",
    "global.anthropic.claude-haiku-4-5-20251001-v1:0",
    "global.anthropic.claude-opus-4-5-20251101-v1:0",
];

/// Claude Code CLI model aliases.
pub const CLAUDE_CODE_MODELS: &[&str] = &[
    "claude-sonnet-4-6",
    "claude-opus-4-6",
    "claude-haiku-4-5-20251001",
];

/// Codex CLI model identifiers.
pub const CODEX_MODELS: &[&str] = &[
    "gpt-5.3-codex",
    "gpt-5.2-codex",
    "gpt-5.2",
    "gpt-5.1-codex-max",
    "gpt-5-codex-mini",
];

/// Regions with Bedrock availability.
pub const BEDROCK_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-northeast-1",
];

/// Per-backend configuration, immutable for the lifetime of one adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub active_provider: Provider,

    // Ollama
    pub ollama_base_url: String,
    pub ollama_model: String,

    // OpenAI API
    pub openai_api_key: String,
    pub openai_model: String,

    // Anthropic API
    pub anthropic_api_key: String,
    pub anthropic_model: String,

    // Gemini API
    pub gemini_api_key: String,
    pub gemini_model: String,

    // Bedrock
    pub bedrock_access_key: String,
    pub bedrock_secret_key: String,
    pub bedrock_session_token: String,
    pub bedrock_region: String,
    pub bedrock_model: String,

    // Claude Code CLI
    pub claude_code_path: String,
    pub claude_code_model: String,

    // Codex CLI
    pub codex_path: String,
    pub codex_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            active_provider: Provider::Ollama,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o".to_string(),
            anthropic_api_key: String::new(),
            anthropic_model: "claude-sonnet-4-5-20250929".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            bedrock_access_key: String::new(),
            bedrock_secret_key: String::new(),
            bedrock_session_token: String::new(),
            bedrock_region: "us-east-1".to_string(),
            bedrock_model: BEDROCK_MODELS[0].to_string(),
            claude_code_path: String::new(),
            claude_code_model: CLAUDE_CODE_MODELS[0].to_string(),
            codex_path: String::new(),
            codex_model: CODEX_MODELS[0].to_string(),
        }
    }
}

impl LlmSettings {
    /// Model configured for the given backend.
    pub fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::Ollama => &self.ollama_model,
            Provider::OpenAi => &self.openai_model,
            Provider::Anthropic => &self.anthropic_model,
            Provider::Gemini => &self.gemini_model,
            Provider::Bedrock => &self.bedrock_model,
            Provider::ClaudeCode => &self.claude_code_model,
            Provider::Codex => &self.codex_model,
        }
    }

    /// Pure pre-flight predicate: whether the given backend has enough
    /// configuration to attempt a call.
    pub fn has_valid_config(&self, provider: Provider) -> bool {
        match provider {
            Provider::Ollama => !self.ollama_base_url.trim().is_empty(),
            Provider::OpenAi => !self.openai_api_key.trim().is_empty(),
            Provider::Anthropic => !self.anthropic_api_key.trim().is_empty(),
            Provider::Gemini => !self.gemini_api_key.trim().is_empty(),
            Provider::Bedrock => credentials::any_source_available(
                &self.bedrock_access_key,
                &self.bedrock_secret_key,
                &self.bedrock_session_token,
            ),
            Provider::ClaudeCode => is_executable(&self.claude_code_path),
            Provider::Codex => is_executable(&self.codex_path),
        }
    }

    /// Convenience form for the active backend.
    pub fn has_valid_active_config(&self) -> bool {
        self.has_valid_config(self.active_provider)
    }
}

/// Whether a configured CLI path points at something runnable: an
/// existing file for explicit paths, a PATH lookup for bare names.
fn is_executable(configured_path: &str) -> bool {
    let trimmed = configured_path.trim();
    if trimmed.is_empty() {
        return false;
    }
    let path = Path::new(trimmed);
    if path.components().count() > 1 {
        path.is_file()
    } else {
        which::which(trimmed).is_ok()
    }
}
