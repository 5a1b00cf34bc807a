//! Tools module - tool definitions and execution for LLM function calling
//!
//! This module provides the infrastructure for defining and executing tools
//! the LLM can call during a turn:
//!
//! - `Tool` trait: the interface all tools implement
//! - `ToolContext`: execution context (channel, chat_id, message_id, workspace)
//! - `ToolRegistry`: validation and execution with errors reified as strings
//! - `MessageTool`: proactive outbound delivery with reply suppression
//!
//! Tool errors are deliberately not raised out of the registry; they are
//! converted into content the LLM can react to, with a short appended hint
//! nudging it toward a different approach.

pub mod message;
mod registry;

pub use message::MessageTool;
pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Trait that all tools must implement.
///
/// Tools are async functions the LLM can invoke to act on the world.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use attoclaw::tools::{Tool, ToolContext};
/// use attoclaw::error::Result;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl Tool for MyTool {
///     fn name(&self) -> &str { "my_tool" }
///     fn description(&self) -> &str { "Does something useful" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": {},
///             "required": []
///         })
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
///         Ok("Done!".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool name; unique within a registry.
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters (object type at the root).
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// The returned string is what the LLM sees as the tool result.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

/// Context provided to tools during execution.
///
/// Carries the routing information of the turn being processed so tools
/// like `message` can target the originating conversation.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The channel name (e.g., "telegram", "cli")
    pub channel: Option<String>,
    /// The chat/conversation ID within the channel
    pub chat_id: Option<String>,
    /// The channel's original message identifier, when forwarded
    pub message_id: Option<String>,
    /// The workspace directory for file operations
    pub workspace: Option<String>,
}

impl ToolContext {
    /// Create a new empty tool context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel and chat ID.
    ///
    /// # Example
    /// ```
    /// use attoclaw::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new().with_channel("telegram", "123456");
    /// assert_eq!(ctx.channel.as_deref(), Some("telegram"));
    /// ```
    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    /// Set the originating message identifier.
    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    /// Set the workspace directory.
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }
}

/// A simple echo tool for testing the tool infrastructure.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        Ok(args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string())
    }
}
