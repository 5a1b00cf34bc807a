//! Message tool for proactive outbound delivery.
//!
//! Lets the LLM push a message to a chat mid-turn instead of (or before)
//! the default end-of-turn reply. The tool records that it has sent
//! something during the current turn; the engine reads that flag to
//! suppress the duplicate default delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::{AttoError, Result};

use super::{Tool, ToolContext};

/// Tool for sending outbound messages to channels.
pub struct MessageTool {
    bus: Arc<MessageBus>,
    sent_in_turn: Arc<AtomicBool>,
}

impl MessageTool {
    /// Create a new message tool publishing on `bus` and reporting sends
    /// through `sent_in_turn`.
    pub fn new(bus: Arc<MessageBus>, sent_in_turn: Arc<AtomicBool>) -> Self {
        Self { bus, sent_in_turn }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user immediately. Use this to deliver partial \
         results or status updates before the turn finishes. When you call \
         this, the final response is not re-sent automatically."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Message text to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Destination channel. Omit when replying; the originating channel is used automatically."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Destination chat ID. Omit when replying; the originating chat is used automatically."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AttoError::Tool("Missing 'content' parameter".to_string()))?;

        let channel = args
            .get("channel")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.channel.clone())
            .ok_or_else(|| AttoError::Tool("No target channel specified".to_string()))?;

        let chat_id = args
            .get("chat_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.chat_id.clone())
            .ok_or_else(|| AttoError::Tool("No target chat_id specified".to_string()))?;

        self.bus
            .publish_outbound(OutboundMessage::new(&channel, &chat_id, content))
            .map_err(|e| AttoError::Tool(format!("Failed to publish message: {}", e)))?;

        self.sent_in_turn.store(true, Ordering::SeqCst);

        Ok(format!("Message sent to {}:{}", channel, chat_id))
    }
}
