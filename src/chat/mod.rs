//! Conversation data model.
//!
//! Messages are immutable once constructed; the history is a bounded FIFO
//! buffer observed by registered listeners.

pub mod history;
pub mod message;

pub use history::{ConversationHistory, HistoryListener};
pub use message::{ChatMessage, Role};
