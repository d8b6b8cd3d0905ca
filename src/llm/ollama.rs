//! Adapter for a local Ollama server.
//!
//! API reference: <https://github.com/ollama/ollama/blob/main/docs/api.md>

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use url::Url;

use crate::chat::ChatMessage;
use crate::llm::client::{CONNECTION_TEST_PROMPT, LlmClient};
use crate::llm::openai_style_messages;
use crate::llm::types::{Completion, LlmError, StreamSink};

const GENERATE_PATH: &str = "/api/generate";
const CHAT_PATH: &str = "/api/chat";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Short read poll so a cancellation flag is observed between chunks
/// even when the model is slow to produce the next token.
const READ_POLL: Duration = Duration::from_secs(2);

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: resolve_base_url(base_url),
            model: model.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn chat_body(&self, history: &[ChatMessage], new_message: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "stream": stream,
            "messages": openai_style_messages(history, new_message),
        })
    }

    async fn send(&self, path: &str, body: &Value, chat_endpoint: bool) -> Result<Completion, LlmError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                LlmError::Network(format!(
                    "no response from Ollama at {}: {err}",
                    self.base_url
                ))
            })?;

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
            .map_err(|err| LlmError::Protocol(format!("malformed Ollama response: {err}")))?;
        Ok(parse_completion(&payload, chat_endpoint))
    }
}

/// Ensure the configured base URL has a scheme; malformed input falls
/// back to the local default rather than failing construction.
fn resolve_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some() => candidate,
        _ => {
            tracing::warn!(base_url = raw, "invalid Ollama base URL, using default");
            DEFAULT_BASE_URL.to_string()
        }
    }
}

/// Extract text, optional reasoning, and token counts from a non-streaming
/// response. The generate endpoint answers with top-level `response`, the
/// chat endpoint with `message.content`.
fn parse_completion(payload: &Value, chat_endpoint: bool) -> Completion {
    let (content, thinking) = if chat_endpoint {
        let message = &payload["message"];
        (
            message["content"].as_str().unwrap_or_default(),
            message["thinking"].as_str(),
        )
    } else {
        (
            payload["response"].as_str().unwrap_or_default(),
            payload["thinking"].as_str(),
        )
    };

    let text = match thinking {
        Some(thinking) if !thinking.is_empty() => {
            format!("<thinking>\n{thinking}\n</thinking>\n\n{content}")
        }
        _ => content.to_string(),
    };

    Completion::new(text, token_count(payload))
}

/// Per-call state for the NDJSON chat stream: thinking-tag emission and
/// the running token total.
struct StreamAssembler {
    total_tokens: u64,
    emitted_thinking: bool,
    closed_thinking: bool,
}

impl StreamAssembler {
    fn new() -> Self {
        Self {
            total_tokens: 0,
            emitted_thinking: false,
            closed_thinking: false,
        }
    }

    /// Deliver one parsed stream line to the sink. Returns true when the
    /// line carried the done flag. The terminal line can carry both
    /// content and the done flag; its chunk is delivered before
    /// completion.
    fn feed(&mut self, event: &Value, sink: &dyn StreamSink) -> bool {
        let message = &event["message"];
        if let Some(thinking) = message["thinking"].as_str().filter(|t| !t.is_empty()) {
            if !self.emitted_thinking {
                sink.on_chunk("<thinking>\n");
                self.emitted_thinking = true;
            }
            sink.on_chunk(thinking);
        }
        if let Some(content) = message["content"].as_str().filter(|c| !c.is_empty()) {
            if self.emitted_thinking && !self.closed_thinking {
                sink.on_chunk("\n</thinking>\n\n");
                self.closed_thinking = true;
            }
            sink.on_chunk(content);
        }

        if event["done"].as_bool() == Some(true) {
            self.total_tokens += token_count(event);
            return true;
        }
        false
    }
}

fn token_count(payload: &Value) -> u64 {
    payload["eval_count"].as_u64().unwrap_or(0) + payload["prompt_eval_count"].as_u64().unwrap_or(0)
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }
        self.send(GENERATE_PATH, &body, false).await
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        let body = self.chat_body(history, new_message, false);
        self.send(CHAT_PATH, &body, true).await
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn chat_streaming(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        sink: &dyn StreamSink,
    ) {
        let body = self.chat_body(history, new_message, true);
        let response = match self
            .http
            .post(self.endpoint(CHAT_PATH))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if !sink.is_cancelled() {
                    sink.on_error(&format!("Ollama streaming error: {err}"));
                }
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            sink.on_error(
                &LlmError::Api {
                    status: status.as_u16(),
                    body,
                }
                .to_string(),
            );
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut assembler = StreamAssembler::new();
        let mut done = false;

        while !done {
            // Dropping the stream closes the connection, which is the
            // entirety of cancellation cleanup for HTTP.
            if sink.is_cancelled() {
                return;
            }

            let chunk = match tokio::time::timeout(READ_POLL, stream.next()).await {
                // Poll expired without data: re-check the cancel flag.
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    if !sink.is_cancelled() {
                        sink.on_error(&format!("Ollama streaming error: {err}"));
                    }
                    return;
                }
                Ok(Some(Ok(bytes))) => bytes,
            };

            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let event: Value = match serde_json::from_str(line) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(%err, line, "skipping malformed Ollama stream line");
                        continue;
                    }
                };

                if sink.is_cancelled() {
                    return;
                }

                if assembler.feed(&event, sink) {
                    done = true;
                    break;
                }
            }
        }

        if !sink.is_cancelled() {
            sink.on_complete(assembler.total_tokens);
        }
    }

    async fn test_connection(&self) -> bool {
        self.complete(CONNECTION_TEST_PROMPT, None).await.is_ok()
    }

    fn provider_name(&self) -> &str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
