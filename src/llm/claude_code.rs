//! Adapter for the Claude Code CLI agent.
//!
//! Conversations are flattened into a single stdin prompt; output comes
//! back as one JSON object (`--output-format json`) or as an NDJSON
//! event stream (`stream-json`).

use async_trait::async_trait;
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::llm::cli;
use crate::llm::client::LlmClient;
use crate::llm::types::{Completion, LlmError, StreamSink};

pub struct ClaudeCodeClient {
    program: String,
    model: String,
}

impl ClaudeCodeClient {
    pub fn new(program: &str, model: &str) -> Self {
        Self {
            program: program.to_string(),
            model: model.to_string(),
        }
    }

    fn args(&self, output_format: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            output_format.to_string(),
        ];
        if output_format == "stream-json" {
            args.push("--verbose".to_string());
        }
        args.push("--model".to_string());
        args.push(self.model.clone());
        // Untrusted HTTP traffic flows into prompts, so the agent must run
        // with no tools at all: --tools "" strips the tool set and
        // --allowedTools "" keeps none auto-approved. Both flags are
        // required on every invocation.
        args.push("--tools".to_string());
        args.push(String::new());
        args.push("--allowedTools".to_string());
        args.push(String::new());
        args
    }

    async fn run_prompt(&self, prompt: &str) -> Result<Completion, LlmError> {
        let output = cli::run(&self.program, self.args("json"), prompt).await?;
        parse_sync_output(&output.stdout)
    }

    /// Trimmed `--version` output, when the CLI is runnable.
    pub async fn version(&self) -> Option<String> {
        cli::version(&self.program).await
    }
}

fn usage_tokens(usage: &Value) -> u64 {
    usage["input_tokens"].as_u64().unwrap_or(0) + usage["output_tokens"].as_u64().unwrap_or(0)
}

fn parse_sync_output(stdout: &str) -> Result<Completion, LlmError> {
    match serde_json::from_str::<Value>(stdout) {
        Ok(payload) => {
            let text = payload["result"].as_str().unwrap_or_default();
            Ok(Completion::new(text, usage_tokens(&payload["usage"])))
        }
        // Older CLI builds sometimes emit plain text; take raw stdout as
        // the response when there is any.
        Err(err) => {
            let trimmed = stdout.trim();
            if trimmed.is_empty() {
                Err(LlmError::Protocol(format!(
                    "failed to parse Claude Code response: {err}"
                )))
            } else {
                Ok(Completion::new(trimmed, 0))
            }
        }
    }
}

#[async_trait]
impl LlmClient for ClaudeCodeClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let full_prompt = match system_prompt.filter(|s| !s.is_empty()) {
            Some(system) => format!("{system}\n\n{prompt}"),
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
        let mut stream = match cli::stream(&self.program, self.args("stream-json"), &prompt).await {
            Ok(stream) => stream,
            Err(err) => {
                if !sink.is_cancelled() {
                    sink.on_error(&err.to_string());
                }
                return;
            }
        };

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
                    tracing::warn!(%err, line, "skipping malformed Claude Code event");
                    continue;
                }
            };

            match event["type"].as_str().unwrap_or_default() {
                // Whole assistant message: emit each text block.
                "assistant" => {
                    if let Some(blocks) = event["message"]["content"].as_array() {
                        for block in blocks {
                            if block["type"].as_str() == Some("text") {
                                if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty())
                                {
                                    sink.on_chunk(text);
                                }
                            }
                        }
                    }
                }
                "content_block_delta" => {
                    let delta = &event["delta"];
                    if delta["type"].as_str() == Some("text_delta") {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            sink.on_chunk(text);
                        }
                    }
                }
                // Terminal event; dropping the stream reaps the child.
                "result" => {
                    if !sink.is_cancelled() {
                        sink.on_complete(usage_tokens(&event["usage"]));
                    }
                    return;
                }
                _ => {}
            }
        }

        // EOF without a result event: fall back to the exit status.
        match stream.finish().await {
            Ok(()) => {
                if !sink.is_cancelled() {
                    sink.on_complete(0);
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
        "Claude Code"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_always_disables_tools() {
        let client = ClaudeCodeClient::new("claude", "claude-sonnet-4-6");
        let args = client.args("json");
        assert_eq!(
            args,
            vec![
                "-p",
                "--output-format",
                "json",
                "--model",
                "claude-sonnet-4-6",
                "--tools",
                "",
                "--allowedTools",
                "",
            ]
        );
    }

    #[test]
    fn streaming_argv_adds_verbose() {
        let client = ClaudeCodeClient::new("claude", "claude-sonnet-4-6");
        let args = client.args("stream-json");
        assert!(args.contains(&"--verbose".to_string()));
        assert!(args.contains(&"--tools".to_string()));
        assert!(args.contains(&"--allowedTools".to_string()));
    }

    #[test]
    fn sync_output_parses_result_and_usage() {
        let stdout = r#"{"result":"the answer","usage":{"input_tokens":7,"output_tokens":3}}"#;
        let completion = parse_sync_output(stdout).unwrap();
        assert_eq!(completion.text, "the answer");
        assert_eq!(completion.tokens_used, 10);
    }

    #[test]
    fn non_json_stdout_is_taken_verbatim() {
        let completion = parse_sync_output("plain text answer\n").unwrap();
        assert_eq!(completion.text, "plain text answer");
        assert_eq!(completion.tokens_used, 0);
    }

    #[test]
    fn empty_stdout_is_a_protocol_error() {
        let err = parse_sync_output("   ").unwrap_err();
        assert!(matches!(err, LlmError::Protocol(_)));
    }
}
