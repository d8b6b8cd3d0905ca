use serde::{Deserialize, Serialize};

/// Successful outcome of a completion or chat call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// Combined token count as reported by the backend; 0 when unknown.
    pub tokens_used: u64,
}

impl Completion {
    pub fn new(text: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            text: text.into(),
            tokens_used,
        }
    }
}

/// One event of a streaming call.
///
/// A stream is zero or more `Chunk`s followed by exactly one terminal
/// event; nothing is emitted after the terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Complete { tokens_used: u64 },
    Error(String),
}

/// Consumer of streaming events, supplied by the caller.
///
/// `is_cancelled` is a polled flag: adapters check it before delivering
/// each chunk and before the terminal event. Once it reads true the
/// adapter stops producing events and releases its transport resource
/// without reporting an error for the cancellation itself.
pub trait StreamSink: Send + Sync {
    fn on_chunk(&self, text: &str);
    fn on_complete(&self, tokens_used: u64);
    fn on_error(&self, message: &str);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Failure surfaced by an adapter.
///
/// Adapters convert every failure into one of these variants; nothing
/// panics or unwinds across the [`LlmClient`](crate::llm::LlmClient)
/// boundary. Raw backend detail (status code and body, exit code and
/// stderr) is preserved for debuggability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// Missing or invalid configuration, reported before any I/O attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection or send failure before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("backend error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// Malformed response or event payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A call or subprocess exceeded its ceiling.
    #[error("timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// A CLI agent subprocess failed.
    #[error("process exited with code {code}{}", stderr_suffix(.stderr))]
    Process { code: i32, stderr: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
