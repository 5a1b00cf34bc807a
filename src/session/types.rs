//! Session types for AttoClaw
//!
//! This module defines the core types for conversation state: role-tagged
//! chat messages (with mixed text/image content for user turns and
//! tool-call records for assistant turns) and the `Session` container with
//! its consolidation cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
    /// Results from tool executions
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Message content: either a plain string or an ordered sequence of parts
/// mixing text and inline images. Serialized untagged so plain-text
/// messages stay plain strings on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Mixed content parts (images followed by text)
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The textual portion of this content. For mixed parts, text parts
    /// are joined with newlines.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether this content carries no text and no parts.
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

/// One element of mixed message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// A text fragment
    #[serde(rename = "text")]
    Text { text: String },
    /// An inline image given as a `data:` URL
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image reference inside a content part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    /// `data:<mime>;base64,<bytes>` URL
    pub url: String,
}

/// The function payload of a tool-call record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments (Unicode preserved literally)
    pub arguments: String,
}

/// A tool call issued by the assistant, serialized in the
/// OpenAI-function style used by chat-completion providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// Unique identifier for this tool call
    pub id: String,
    /// Record type; always `"function"`
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function name and encoded arguments
    pub function: FunctionCall,
}

impl ToolCallRecord {
    /// Create a new tool-call record.
    ///
    /// # Example
    /// ```
    /// use attoclaw::session::ToolCallRecord;
    ///
    /// let call = ToolCallRecord::new("call_1", "web_search", r#"{"query":"rust"}"#);
    /// assert_eq!(call.function.name, "web_search");
    /// assert_eq!(call.call_type, "function");
    /// ```
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// A single message in a conversation.
///
/// Fields beyond `role` are role-dependent: `tool_calls` appears on
/// assistant messages, `tool_call_id`/`name` on tool results. `content`
/// is always serialized (null when absent) because some providers reject
/// an omitted key. `timestamp` and `tools_used` are persistence-only and
/// stripped from the LLM-visible history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The role of the message sender
    pub role: Role,
    /// The message content; serialized as null when absent
    pub content: Option<MessageContent>,
    /// Tool calls made by the assistant (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    /// ID of the tool call this message is responding to (tool results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that produced this result (tool results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque provider-reasoning payload; forwarded within a turn, never persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// ISO-8601 local timestamp stamped at persistence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Names of tools invoked while producing this assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
}

impl ChatMessage {
    fn base(role: Role, content: Option<MessageContent>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
            reasoning_content: None,
            timestamp: None,
            tools_used: None,
        }
    }

    /// Create a new user message with plain text content.
    ///
    /// # Example
    /// ```
    /// use attoclaw::session::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::base(Role::User, Some(content.into()))
    }

    /// Create a new user message with mixed content parts.
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self::base(Role::User, Some(MessageContent::Parts(parts)))
    }

    /// Create a new assistant message. `content` may be absent when the
    /// model produced only tool calls.
    pub fn assistant(content: Option<&str>) -> Self {
        Self::base(Role::Assistant, content.map(MessageContent::from))
    }

    /// Create an assistant message carrying tool calls and an optional
    /// opaque reasoning payload.
    pub fn assistant_with_tools(
        content: Option<&str>,
        tool_calls: Vec<ToolCallRecord>,
        reasoning_content: Option<&str>,
    ) -> Self {
        let mut msg = Self::assistant(content);
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg.reasoning_content = reasoning_content.map(str::to_string);
        msg
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::base(Role::System, Some(content.into()))
    }

    /// Create a new tool result message.
    ///
    /// # Example
    /// ```
    /// use attoclaw::session::{ChatMessage, Role};
    ///
    /// let msg = ChatMessage::tool_result("call_123", "read_file", "contents");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    /// ```
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        let mut msg = Self::base(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg.name = Some(name.to_string());
        msg
    }

    /// Check if this message has tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }

    /// The textual content of this message, empty when absent.
    pub fn content_text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::as_text)
            .unwrap_or_default()
    }

    /// Copy of this message reduced to the protocol fields fed to the LLM
    /// (`role`, `content`, `tool_calls`, `tool_call_id`, `name`).
    pub fn wire_view(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: self.tool_call_id.clone(),
            name: self.name.clone(),
            reasoning_content: None,
            timestamp: None,
            tools_used: None,
        }
    }
}

/// A conversation session containing messages and metadata.
///
/// Sessions are identified by a unique key (`channel:chat_id`) and store
/// the full conversation history. `messages` is append-only during normal
/// operation: consolidation never deletes or reorders entries, it only
/// advances `last_consolidated`. The `/new` command is the sole operation
/// that truncates `messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session (e.g., "telegram:chat123")
    pub key: String,
    /// Ordered list of messages in this conversation
    pub messages: Vec<ChatMessage>,
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last modified
    pub updated_at: DateTime<Utc>,
    /// Free-form session metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Index of the first message not yet archived into long-term memory.
    /// Invariant: `0 <= last_consolidated <= messages.len()`.
    #[serde(default)]
    pub last_consolidated: usize,
}

impl Session {
    /// Create a new empty session with the given key.
    ///
    /// # Example
    /// ```
    /// use attoclaw::session::Session;
    ///
    /// let session = Session::new("telegram:chat123");
    /// assert!(session.messages.is_empty());
    /// assert_eq!(session.last_consolidated, 0);
    /// ```
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            last_consolidated: 0,
        }
    }

    /// Append a message to this session and bump `updated_at`.
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Clear all messages and reset the consolidation cursor.
    ///
    /// This is the `/new` path; it is the only operation that removes
    /// entries from `messages`.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_consolidated = 0;
        self.updated_at = Utc::now();
    }

    /// Number of messages not yet covered by consolidation.
    pub fn unconsolidated_count(&self) -> usize {
        self.messages.len().saturating_sub(self.last_consolidated)
    }

    /// Build the LLM-visible history window.
    ///
    /// 1. Take `messages[last_consolidated..]`.
    /// 2. Keep only the last `max_messages`.
    /// 3. Left-trim leading entries until the first `user` entry, so the
    ///    window never opens with a dangling `tool`/`assistant` entry that
    ///    references tool-call IDs outside the window. No `user` entry
    ///    means an empty result.
    /// 4. Strip persistence-only fields from each kept entry.
    pub fn get_history(&self, max_messages: usize) -> Vec<ChatMessage> {
        let cursor = self.last_consolidated.min(self.messages.len());
        let window = &self.messages[cursor..];

        let start = window.len().saturating_sub(max_messages);
        let window = &window[start..];

        let first_user = match window.iter().position(|m| m.role == Role::User) {
            Some(idx) => idx,
            None => return Vec::new(),
        };

        window[first_user..]
            .iter()
            .map(ChatMessage::wire_view)
            .collect()
    }

    /// Get the number of messages in this session.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session is empty (no messages).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message in this session, if any.
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
