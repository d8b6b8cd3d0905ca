use crate::chat::message::{ChatMessage, Role};
use std::sync::{Arc, RwLock};

/// Maximum number of messages retained per conversation.
const MAX_HISTORY_SIZE: usize = 100;

/// Observer of history mutations.
///
/// Listeners are invoked synchronously on the mutating thread, in
/// registration order. Callers that update UI state must marshal the
/// callback onto their own thread.
pub trait HistoryListener: Send + Sync {
    fn on_message_added(&self, message: &ChatMessage);
    fn on_history_cleared(&self);
}

/// Ordered, capacity-bounded buffer of chat messages for one session.
///
/// Insertion past capacity evicts the oldest message. The structure is
/// safe to read concurrently with appends, but callers are responsible
/// for serializing their own appends per session.
pub struct ConversationHistory {
    messages: RwLock<Vec<ChatMessage>>,
    listeners: RwLock<Vec<Arc<dyn HistoryListener>>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_message(&self, message: ChatMessage) {
        {
            let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
            messages.push(message.clone());
            while messages.len() > MAX_HISTORY_SIZE {
                messages.remove(0);
            }
        }

        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener.on_message_added(&message);
        }
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.add_message(ChatMessage::new(Role::User, content));
    }

    pub fn add_user_message_with_context(
        &self,
        content: impl Into<String>,
        attached_context: impl Into<String>,
    ) {
        self.add_message(ChatMessage::with_attached_context(
            Role::User,
            content,
            attached_context,
        ));
    }

    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.add_message(ChatMessage::new(Role::Assistant, content));
    }

    pub fn add_system_message(&self, content: impl Into<String>) {
        self.add_message(ChatMessage::new(Role::System, content));
    }

    /// Snapshot of the retained messages in insertion order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.messages.write().unwrap_or_else(|e| e.into_inner()).clear();

        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener.on_history_cleared();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_listener(&self, listener: Arc<dyn HistoryListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
