//! Adapter for the Anthropic messages API.
//!
//! The messages wire format (system field lifted out of the message
//! array, text-block content, input/output token usage) is shared with
//! the Bedrock adapter, which invokes the same model family.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::chat::{ChatMessage, Role};
use crate::llm::client::{CONNECTION_TEST_PROMPT, LlmClient};
use crate::llm::types::{Completion, LlmError};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub(crate) const MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn send(&self, mut body: Value) -> Result<Completion, LlmError> {
        body["model"] = json!(self.model);
        body["max_tokens"] = json!(MAX_TOKENS);

        let response = self
            .http
            .post(API_URL)
            .timeout(REQUEST_TIMEOUT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Network(format!("no response from Claude API: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|err| LlmError::Protocol(format!("malformed Claude response: {err}")))?;
        parse_messages_payload(&payload)
    }
}

/// Split a conversation into the messages-API shape: the first System
/// entry becomes the top-level `system` field, remaining System entries
/// are dropped, and the new user message is appended last.
pub(crate) fn lift_system_messages(
    history: &[ChatMessage],
    new_message: &str,
) -> (Option<String>, Vec<Value>) {
    let system = history
        .iter()
        .find(|msg| msg.role() == Role::System)
        .map(|msg| msg.full_content());

    let mut messages: Vec<Value> = history
        .iter()
        .filter(|msg| msg.role() != Role::System)
        .map(|msg| {
            json!({
                "role": msg.role().api_value(),
                "content": msg.full_content(),
            })
        })
        .collect();
    messages.push(json!({"role": "user", "content": new_message}));

    (system, messages)
}

/// Concatenate the text blocks of a messages-API response and sum the
/// input/output token counts.
pub(crate) fn parse_messages_payload(payload: &Value) -> Result<Completion, LlmError> {
    let blocks = payload["content"]
        .as_array()
        .filter(|blocks| !blocks.is_empty())
        .ok_or_else(|| LlmError::Protocol("no response content from Claude".to_string()))?;

    let text: String = blocks
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();

    let usage = &payload["usage"];
    let tokens =
        usage["input_tokens"].as_u64().unwrap_or(0) + usage["output_tokens"].as_u64().unwrap_or(0);

    Ok(Completion::new(text, tokens))
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let mut body = json!({
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }
        self.send(body).await
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        let (system, messages) = lift_system_messages(history, new_message);
        let mut body = json!({"messages": messages});
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        self.send(body).await
    }

    async fn test_connection(&self) -> bool {
        self.complete(CONNECTION_TEST_PROMPT, None).await.is_ok()
    }

    fn provider_name(&self) -> &str {
        "Anthropic Claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
