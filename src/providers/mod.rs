//! Provider types for AttoClaw
//!
//! This module defines the chat-completion contract the engine speaks:
//! the `LLMProvider` trait, chat options, and response types. Concrete
//! HTTP clients live outside the engine and implement `LLMProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::session::ChatMessage;

/// Definition of a tool advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "web_search",
    ///     "Search the web for information",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "query": { "type": "string", "description": "Search query" }
    ///         },
    ///         "required": ["query"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "web_search");
    /// ```
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Trait for LLM providers (Anthropic, OpenAI-compatible gateways, mocks).
///
/// The provider translates between the engine's message format and its
/// API format. Calls must be non-blocking with respect to the runtime.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request to the LLM.
    ///
    /// # Arguments
    /// * `messages` - The conversation so far, system prompt first
    /// * `tools` - Tools the LLM may call
    /// * `model` - Optional model override (provider default if None)
    /// * `options` - Sampling options (temperature, max_tokens, ...)
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// The default model for this provider.
    fn default_model(&self) -> &str;

    /// The provider name (e.g., "anthropic").
    fn name(&self) -> &str;
}

/// Options for chat completion requests.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    pub top_p: Option<f32>,
    /// Stop sequences that halt generation
    pub stop: Option<Vec<String>>,
}

impl ChatOptions {
    /// Create new default chat options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the top_p (nucleus sampling) parameter.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set stop sequences that will halt generation.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Response from an LLM chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content of the response, when the model produced any
    pub content: Option<String>,
    /// Tool calls made by the LLM (if any)
    #[serde(default)]
    pub tool_calls: Vec<LLMToolCall>,
    /// Opaque provider-reasoning payload, forwarded verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Token usage information (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// Create a simple text response with no tool calls.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello, world!");
    /// assert!(!response.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            tool_calls: vec![],
            reasoning_content: None,
            usage: None,
        }
    }

    /// Create a response with tool calls.
    pub fn with_tools(content: Option<&str>, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.map(str::to_string),
            tool_calls,
            reasoning_content: None,
            usage: None,
        }
    }

    /// Check if this response contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Set usage information for this response.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A tool call made by the LLM.
///
/// Providers deliver `arguments` either as a JSON object or as a
/// JSON-encoded string; use [`LLMToolCall::arguments_value`] to obtain the
/// parsed object either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// Arguments: a mapping, or a JSON-encoded string of one
    pub arguments: Value,
}

impl LLMToolCall {
    /// Create a new tool call from an argument object.
    pub fn new(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    /// Defensively parse the arguments into a JSON value.
    ///
    /// A string payload is parsed as JSON; an unparsable string yields an
    /// empty object so validation can report proper errors downstream.
    ///
    /// # Example
    /// ```
    /// use attoclaw::providers::LLMToolCall;
    /// use serde_json::{json, Value};
    ///
    /// let direct = LLMToolCall::new("c1", "search", json!({"q": "rust"}));
    /// assert_eq!(direct.arguments_value()["q"], "rust");
    ///
    /// let encoded = LLMToolCall::new("c2", "search", Value::String(r#"{"q":"rust"}"#.into()));
    /// assert_eq!(encoded.arguments_value()["q"], "rust");
    /// ```
    pub fn arguments_value(&self) -> Value {
        match &self.arguments {
            Value::String(s) => {
                serde_json::from_str(s).unwrap_or_else(|_| Value::Object(Default::default()))
            }
            other => other.clone(),
        }
    }

    /// The arguments as a compact JSON string for storage in tool-call
    /// records (Unicode preserved literally).
    pub fn arguments_json(&self) -> String {
        match &self.arguments {
            Value::String(s) if serde_json::from_str::<Value>(s).is_ok() => s.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

/// Token usage information from a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Create new usage information.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
