//! Adapter construction from settings.

use std::time::Duration;

use crate::config::{LlmSettings, Provider};
use crate::llm::{
    AnthropicClient, BedrockClient, ClaudeCodeClient, CodexClient, GeminiClient, LlmClient,
    OllamaClient, OpenAiClient,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client for the API-backed adapters. Per-call ceilings are
/// set by the adapters; only the connect phase is bounded here so that
/// streaming responses are never cut short.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Build the adapter for the active backend.
pub fn create_client(settings: &LlmSettings, http: reqwest::Client) -> Box<dyn LlmClient> {
    client_for(settings.active_provider, settings, http)
}

/// Build the adapter for a specific backend. The match is total: every
/// `Provider` variant maps to exactly one adapter.
pub fn client_for(
    provider: Provider,
    settings: &LlmSettings,
    http: reqwest::Client,
) -> Box<dyn LlmClient> {
    match provider {
        Provider::Ollama => Box::new(OllamaClient::new(
            http,
            &settings.ollama_base_url,
            &settings.ollama_model,
        )),
        Provider::OpenAi => Box::new(OpenAiClient::new(
            http,
            &settings.openai_api_key,
            &settings.openai_model,
        )),
        Provider::Anthropic => Box::new(AnthropicClient::new(
            http,
            &settings.anthropic_api_key,
            &settings.anthropic_model,
        )),
        Provider::Gemini => Box::new(GeminiClient::new(
            http,
            &settings.gemini_api_key,
            &settings.gemini_model,
        )),
        Provider::Bedrock => Box::new(BedrockClient::new(
            http,
            &settings.bedrock_access_key,
            &settings.bedrock_secret_key,
            &settings.bedrock_session_token,
            &settings.bedrock_region,
            &settings.bedrock_model,
        )),
        Provider::ClaudeCode => Box::new(ClaudeCodeClient::new(
            &settings.claude_code_path,
            &settings.claude_code_model,
        )),
        Provider::Codex => Box::new(CodexClient::new(&settings.codex_path, &settings.codex_model)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_builds_its_adapter() {
        let settings = LlmSettings::default();
        let http = default_http_client();
        for provider in Provider::ALL {
            let client = client_for(*provider, &settings, http.clone());
            assert_eq!(client.provider_name(), provider.display_name());
            assert_eq!(client.model(), settings.model(*provider));
        }
    }

    #[test]
    fn active_provider_selects_the_adapter() {
        let settings = LlmSettings {
            active_provider: Provider::Codex,
            ..LlmSettings::default()
        };
        let client = create_client(&settings, default_http_client());
        assert_eq!(client.provider_name(), "OpenAI Codex");
    }

    #[test]
    fn only_native_streaming_backends_report_support() {
        let settings = LlmSettings::default();
        let http = default_http_client();
        for (provider, expected) in [
            (Provider::Ollama, true),
            (Provider::OpenAi, false),
            (Provider::Anthropic, false),
            (Provider::Gemini, false),
            (Provider::Bedrock, false),
            (Provider::ClaudeCode, true),
            (Provider::Codex, true),
        ] {
            let client = client_for(provider, &settings, http.clone());
            assert_eq!(client.supports_streaming(), expected, "{provider}");
        }
    }
}
