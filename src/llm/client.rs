use crate::chat::ChatMessage;
use crate::llm::types::{Completion, LlmError, StreamSink};
use async_trait::async_trait;

/// Capability interface implemented by every backend adapter.
///
/// Adapters are stateless across calls: `chat` resends the full history
/// on every invocation and no server-side session is assumed to exist.
/// All I/O runs with explicit ceilings; no method blocks indefinitely.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-turn call. When `system_prompt` is present it is transmitted
    /// through whatever mechanism the backend uses for system instructions.
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, LlmError>;

    /// Multi-turn call: the full history plus one new user message.
    async fn chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
    ) -> Result<Completion, LlmError>;

    /// Whether `chat_streaming` emits incremental chunks natively.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Streaming chat. The default implementation performs `chat`
    /// synchronously and replays the single result as one chunk followed
    /// by the terminal event; adapters with native streaming override it.
    async fn chat_streaming(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        sink: &dyn StreamSink,
    ) {
        let result = self.chat(history, new_message).await;
        if sink.is_cancelled() {
            return;
        }
        match result {
            Ok(completion) => {
                sink.on_chunk(&completion.text);
                if !sink.is_cancelled() {
                    sink.on_complete(completion.tokens_used);
                }
            }
            Err(err) => sink.on_error(&err.to_string()),
        }
    }

    /// Issue a minimal real call and report overall reachability.
    /// Never errors; resolves to a boolean.
    async fn test_connection(&self) -> bool;

    /// Human-readable backend name.
    fn provider_name(&self) -> &str;

    /// Model identifier this adapter was configured with.
    fn model(&self) -> &str;
}

/// Standard probe prompt used by HTTP adapters for `test_connection`.
pub(crate) const CONNECTION_TEST_PROMPT: &str = "Say 'OK' if you can read this.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::RecordingSink;
    use crate::llm::types::StreamEvent;

    struct FixedClient {
        result: Result<Completion, LlmError>,
    }

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> Result<Completion, LlmError> {
            self.result.clone()
        }

        async fn chat(
            &self,
            _history: &[ChatMessage],
            _new_message: &str,
        ) -> Result<Completion, LlmError> {
            self.result.clone()
        }

        async fn test_connection(&self) -> bool {
            self.result.is_ok()
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }
    }

    #[tokio::test]
    async fn fallback_replays_success_as_chunk_then_complete() {
        let client = FixedClient {
            result: Ok(Completion::new("the answer", 12)),
        };
        let sink = RecordingSink::new();
        client.chat_streaming(&[], "question", &sink).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            [
                StreamEvent::Chunk("the answer".to_string()),
                StreamEvent::Complete { tokens_used: 12 },
            ]
        );
    }

    #[tokio::test]
    async fn fallback_replays_failure_as_single_error() {
        let client = FixedClient {
            result: Err(LlmError::Network("connection refused".to_string())),
        };
        let sink = RecordingSink::new();
        client.chat_streaming(&[], "question", &sink).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(msg) if msg.contains("connection refused")));
    }

    #[tokio::test]
    async fn fallback_emits_nothing_when_cancelled_before_delivery() {
        let client = FixedClient {
            result: Ok(Completion::new("ignored", 1)),
        };
        let sink = RecordingSink::new();
        sink.cancel();
        client.chat_streaming(&[], "question", &sink).await;

        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fallback_suppresses_complete_when_cancelled_after_chunk() {
        let client = FixedClient {
            result: Ok(Completion::new("partial", 5)),
        };
        let sink = RecordingSink::cancel_after(1);
        client.chat_streaming(&[], "question", &sink).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.as_slice(), [StreamEvent::Chunk("partial".to_string())]);
    }
}
