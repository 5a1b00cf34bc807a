//! AttoClaw - Ultra-lightweight conversational agent engine

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod memory;
pub mod providers;
pub mod session;
pub mod skills;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, ContextBuilder};
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{AttoError, Result};
pub use memory::MemoryStore;
pub use providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};
pub use session::{ChatMessage, MessageContent, Role, Session, SessionStore, ToolCallRecord};
