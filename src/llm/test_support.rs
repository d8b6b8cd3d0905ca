//! Shared fixtures for adapter tests.

use crate::llm::types::{StreamEvent, StreamSink};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sink that records every event and optionally flips to cancelled after
/// a fixed number of chunks.
pub(crate) struct RecordingSink {
    pub events: Mutex<Vec<StreamEvent>>,
    cancelled: AtomicBool,
    cancel_after_chunks: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            cancel_after_chunks: None,
        }
    }

    pub fn cancel_after(chunks: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            cancel_after_chunks: Some(chunks),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn chunk_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, StreamEvent::Chunk(_)))
            .count()
    }
}

impl StreamSink for RecordingSink {
    fn on_chunk(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(StreamEvent::Chunk(text.to_string()));
        if let Some(limit) = self.cancel_after_chunks
            && self.chunk_count() >= limit
        {
            self.cancel();
        }
    }

    fn on_complete(&self, tokens_used: u64) {
        self.events
            .lock()
            .unwrap()
            .push(StreamEvent::Complete { tokens_used });
    }

    fn on_error(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(StreamEvent::Error(message.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
