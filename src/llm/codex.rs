//! Adapter for the OpenAI Codex CLI (`codex exec`).
//!
//! Codex emits cumulative `item.*` events: each one carries the full
//! text of an agent message so far, keyed by item id. Streaming derives
//! chunk deltas by remembering the last-seen length per item.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::llm::cli;
use crate::llm::client::LlmClient;
use crate::llm::types::{Completion, LlmError, StreamSink};

pub struct CodexClient {
    program: String,
    model: String,
}

impl CodexClient {
    pub fn new(program: &str, model: &str) -> Self {
        Self {
            program: program.to_string(),
            model: model.to_string(),
        }
    }

    fn args(&self) -> Vec<String> {
        // Prompts carry untrusted HTTP traffic: the sandbox is read-only
        // and both the shell tool and web search are switched off.
        vec![
            "exec".to_string(),
            "--json".to_string(),
            "--ephemeral".to_string(),
            "--skip-git-repo-check".to_string(),
            "--sandbox".to_string(),
            "read-only".to_string(),
            "-c".to_string(),
            "features.shell_tool=false".to_string(),
            "-c".to_string(),
            "web_search=disabled".to_string(),
            "-m".to_string(),
            self.model.clone(),
            // read the prompt from stdin
            "-".to_string(),
        ]
    }

    async fn run_prompt(&self, prompt: &str) -> Result<Completion, LlmError> {
        let output = cli::run(&self.program, self.args(), prompt).await?;
        parse_exec_output(&output.stdout)
    }

    /// Trimmed `--version` output, when the CLI is runnable.
    pub async fn version(&self) -> Option<String> {
        cli::version(&self.program).await
    }
}

fn usage_tokens(usage: &Value) -> u64 {
    usage["input_tokens"].as_u64().unwrap_or(0) + usage["output_tokens"].as_u64().unwrap_or(0)
}

fn agent_message_text(event: &Value) -> Option<&str> {
    let item = &event["item"];
    if item["type"].as_str() == Some("agent_message") {
        item["text"].as_str()
    } else {
        None
    }
}

/// Collect completed agent messages (joined by newline) and the final
/// usage from a full `codex exec --json` transcript.
fn parse_exec_output(stdout: &str) -> Result<Completion, LlmError> {
    let mut text = String::new();
    let mut tokens = 0u64;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: Value = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(%err, line, "skipping malformed Codex event");
                continue;
            }
        };

        match event["type"].as_str().unwrap_or_default() {
            "item.completed" => {
                if let Some(message) = agent_message_text(&event).filter(|t| !t.is_empty()) {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(message);
                }
            }
            "turn.completed" => tokens += usage_tokens(&event["usage"]),
            _ => {}
        }
    }

    if text.is_empty() {
        Err(LlmError::Protocol(
            "No response received from Codex CLI".to_string(),
        ))
    } else {
        Ok(Completion::new(text, tokens))
    }
}

#[async_trait]
impl LlmClient for CodexClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let full_prompt = match system_prompt.filter(|s| !s.is_empty()) {
            Some(system) => format!("System: {system}\n\nUser: {prompt}"),
            None => prompt.to_string(),
        };
        self.run_prompt(&full_prompt).await
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError> {
        self.run_prompt(&cli::transcript(history, new_message)).await
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
        let prompt = cli::transcript(history, new_message);
        let mut stream = match cli::stream(&self.program, self.args(), &prompt).await {
            Ok(stream) => stream,
            Err(err) => {
                if !sink.is_cancelled() {
                    sink.on_error(&err.to_string());
                }
                return;
            }
        };

        let mut total_tokens = 0u64;
        // item id -> byte length of the text already emitted
        let mut emitted: HashMap<String, usize> = HashMap::new();

        loop {
            // next_line kills the child on cancellation, deadline
            // expiry, and read failure.
            let line = match stream.next_line(sink).await {
                Ok(cli::LineRead::Line(line)) => line,
                Ok(cli::LineRead::Eof) => break,
                Ok(cli::LineRead::Cancelled) => return,
                Err(err) => {
                    if !sink.is_cancelled() {
                        sink.on_error(&err.to_string());
                    }
                    return;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let event: Value = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(%err, line, "skipping malformed Codex event");
                    continue;
                }
            };

            match event["type"].as_str().unwrap_or_default() {
                "item.started" | "item.updated" | "item.completed" => {
                    if let Some(text) = agent_message_text(&event) {
                        let id = event["item"]["id"].as_str().unwrap_or_default().to_string();
                        let seen = emitted.get(&id).copied().unwrap_or(0);
                        if let Some(delta) = text.get(seen..).filter(|d| !d.is_empty()) {
                            sink.on_chunk(delta);
                        }
                        emitted.insert(id, text.len());
                    }
                }
                "turn.completed" => total_tokens += usage_tokens(&event["usage"]),
                _ => {}
            }
        }

        match stream.finish().await {
            Ok(()) => {
                if !sink.is_cancelled() {
                    sink.on_complete(total_tokens);
                }
            }
            Err(err) => {
                if !sink.is_cancelled() {
                    sink.on_error(&err.to_string());
                }
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.version().await.is_some()
    }

    fn provider_name(&self) -> &str {
        "OpenAI Codex"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
