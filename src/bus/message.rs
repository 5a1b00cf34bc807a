//! Message types for the AttoClaw message bus
//!
//! This module defines the wire types exchanged between channel adapters
//! and the agent engine.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key marking an outbound message as a streaming interim chunk.
pub const META_PROGRESS: &str = "_progress";
/// Metadata key marking an outbound message as a tool-invocation annotation.
pub const META_TOOL_HINT: &str = "_tool_hint";
/// Metadata key carrying the channel's original message identifier.
pub const META_MESSAGE_ID: &str = "message_id";

/// Represents an incoming message from a channel (e.g., Telegram, Discord, CLI)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g., "telegram", "cli")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Local paths of media attachments (images are inlined into the LLM turn)
    #[serde(default)]
    pub media: Vec<PathBuf>,
    /// Additional metadata key-value pairs
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Optional session key override; `channel:chat_id` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

/// Represents an outgoing message to be sent via a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Additional metadata key-value pairs (reserved: `_progress`, `_tool_hint`)
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl InboundMessage {
    /// Creates a new inbound message with the required fields.
    ///
    /// # Example
    /// ```
    /// use attoclaw::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello, bot!");
    /// assert_eq!(msg.session_key(), "telegram:chat456");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            metadata: HashMap::new(),
            session_key: None,
        }
    }

    /// Attaches a media file path to the message (builder pattern).
    pub fn with_media(mut self, path: impl Into<PathBuf>) -> Self {
        self.media.push(path.into());
        self
    }

    /// Adds a metadata key-value pair to the message (builder pattern).
    ///
    /// # Example
    /// ```
    /// use attoclaw::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello")
    ///     .with_metadata("message_id", serde_json::json!("12345"));
    /// assert!(msg.metadata.contains_key("message_id"));
    /// ```
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Overrides the session key (builder pattern).
    pub fn with_session_key(mut self, key: &str) -> Self {
        self.session_key = Some(key.to_string());
        self
    }

    /// The session key this message routes to: the explicit override when
    /// present, otherwise the canonical `channel:chat_id` form.
    pub fn session_key(&self) -> String {
        self.session_key
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.channel, self.chat_id))
    }

    /// The channel's original message identifier, if the adapter forwarded one.
    pub fn message_id(&self) -> Option<String> {
        match self.metadata.get(META_MESSAGE_ID) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => None,
        }
    }
}

impl OutboundMessage {
    /// Creates a new outbound message.
    ///
    /// # Example
    /// ```
    /// use attoclaw::bus::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello from the bot!");
    /// assert_eq!(msg.channel, "telegram");
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Creates an outbound message as a response to an inbound message,
    /// carrying the inbound metadata through to the channel adapter.
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self {
            channel: msg.channel.clone(),
            chat_id: msg.chat_id.clone(),
            content: content.to_string(),
            metadata: msg.metadata.clone(),
        }
    }

    /// Creates a streaming progress chunk for a chat.
    pub fn progress(channel: &str, chat_id: &str, content: &str) -> Self {
        Self::new(channel, chat_id, content).with_metadata(META_PROGRESS, Value::Bool(true))
    }

    /// Creates a tool-invocation annotation for a chat.
    pub fn tool_hint(channel: &str, chat_id: &str, content: &str) -> Self {
        Self::progress(channel, chat_id, content).with_metadata(META_TOOL_HINT, Value::Bool(true))
    }

    /// Adds a metadata key-value pair to the message (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Whether this message is a streaming interim chunk.
    pub fn is_progress(&self) -> bool {
        matches!(self.metadata.get(META_PROGRESS), Some(Value::Bool(true)))
    }

    /// Whether this message is a tool-invocation annotation.
    pub fn is_tool_hint(&self) -> bool {
        matches!(self.metadata.get(META_TOOL_HINT), Some(Value::Bool(true)))
    }
}
