//! Adapter for the Google Gemini `generateContent` API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::chat::{ChatMessage, Role};
use crate::llm::client::{CONNECTION_TEST_PROMPT, LlmClient};
use crate::llm::types::{Completion, LlmError};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn send(&self, body: Value) -> Result<Completion, LlmError> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Network(format!("no response from Gemini API: {err}")))?;

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
            .map_err(|err| LlmError::Protocol(format!("malformed Gemini response: {err}")))?;
        parse_completion(&payload)
    }
}

fn text_content(role: &str, text: &str) -> Value {
    json!({"role": role, "parts": [{"text": text}]})
}

fn parse_completion(payload: &Value) -> Result<Completion, LlmError> {
    let text = payload["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| LlmError::Protocol("no response content from Gemini".to_string()))?;
    let tokens = payload["usageMetadata"]["totalTokenCount"]
        .as_u64()
        .unwrap_or(0);
    Ok(Completion::new(text, tokens))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let mut body = json!({
            "contents": [text_content("user", prompt)],
        });
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            body["system_instruction"] = json!({"parts": [{"text": system}]});
        }
        self.send(body).await
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        let mut body = json!({});

        // Gemini has no system role in contents; the first System entry
        // becomes the system_instruction and the rest are dropped.
        if let Some(system) = history.iter().find(|msg| msg.role() == Role::System) {
            body["system_instruction"] = json!({"parts": [{"text": system.full_content()}]});
        }

        let mut contents: Vec<Value> = history
            .iter()
            .filter(|msg| msg.role() != Role::System)
            .map(|msg| {
                let role = if msg.role() == Role::User { "user" } else { "model" };
                text_content(role, &msg.full_content())
            })
            .collect();
        contents.push(text_content("user", new_message));
        body["contents"] = json!(contents);

        self.send(body).await
    }

    async fn test_connection(&self) -> bool {
        self.complete(CONNECTION_TEST_PROMPT, None).await.is_ok()
    }

    fn provider_name(&self) -> &str {
        "Google Gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
