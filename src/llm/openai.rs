//! Adapter for the OpenAI chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::chat::ChatMessage;
use crate::llm::client::{CONNECTION_TEST_PROMPT, LlmClient};
use crate::llm::openai_style_messages;
use crate::llm::types::{Completion, LlmError};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn send(&self, messages: Vec<Value>) -> Result<Completion, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
        });

        let response = self
            .http
            .post(API_URL)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Network(format!("no response from OpenAI API: {err}")))?;

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
            .map_err(|err| LlmError::Protocol(format!("malformed OpenAI response: {err}")))?;
        parse_completion(&payload)
    }
}

fn parse_completion(payload: &Value) -> Result<Completion, LlmError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::Protocol("no response content from OpenAI".to_string()))?;
    let tokens = payload["usage"]["total_tokens"].as_u64().unwrap_or(0);
    Ok(Completion::new(content, tokens))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        self.send(messages).await
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        self.send(openai_style_messages(history, new_message)).await
    }

    async fn test_connection(&self) -> bool {
        self.complete(CONNECTION_TEST_PROMPT, None).await.is_ok()
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_and_total_tokens() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 4, "completion_tokens": 6, "total_tokens": 10},
        });
        let completion = parse_completion(&payload).unwrap();
        assert_eq!(completion.text, "hello");
        assert_eq!(completion.tokens_used, 10);
    }

    #[test]
    fn empty_choices_is_a_protocol_error() {
        let err = parse_completion(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let payload = json!({
            "choices": [{"message": {"content": "ok"}}],
        });
        assert_eq!(parse_completion(&payload).unwrap().tokens_used, 0);
    }
}
