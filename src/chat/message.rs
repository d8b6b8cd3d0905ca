use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator inserted between a message body and its attached traffic
/// capture when the message is serialized for a backend.
pub const ATTACHED_CONTEXT_SEPARATOR: &str = "\n\n--- Attached HTTP Request/Response ---\n";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// The lowercase wire token used by chat-completion style APIs.
    pub fn api_value(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// The capitalized label used when flattening a conversation into a
    /// single textual transcript for CLI agents.
    pub fn transcript_label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    /// Captured HTTP request/response text attached by the host, appended
    /// to `content` whenever the message is sent to a backend.
    attached_context: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            attached_context: None,
        }
    }

    pub fn with_attached_context(
        role: Role,
        content: impl Into<String>,
        attached_context: impl Into<String>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            attached_context: Some(attached_context.into()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn attached_context(&self) -> Option<&str> {
        self.attached_context.as_deref()
    }

    pub fn has_attached_context(&self) -> bool {
        self.attached_context
            .as_deref()
            .is_some_and(|ctx| !ctx.is_empty())
    }

    /// The content as transmitted to a backend: the message body plus any
    /// attached capture, joined by the fixed separator.
    pub fn full_content(&self) -> String {
        match self.attached_context.as_deref() {
            Some(ctx) if !ctx.is_empty() => {
                format!("{}{}{}", self.content, ATTACHED_CONTEXT_SEPARATOR, ctx)
            }
            _ => self.content.clone(),
        }
    }
}
