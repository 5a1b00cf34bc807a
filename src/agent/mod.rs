//! Agent module - core engine logic and conversation handling
//!
//! This module contains the reason-act engine of AttoClaw:
//!
//! - Consuming inbound messages from the bus and publishing replies
//! - Assembling the LLM context (system prompt, memory, skills, history)
//! - Driving the bounded tool-call iteration loop with progress streaming
//! - Persisting each turn into the session store
//! - Scheduling background memory consolidation under per-session locks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │             │
//! └─────────────┘     └──────┬──────┘     └─────────────┘
//!                            │
//!              ┌─────────────┼─────────────┐
//!              ▼             ▼             ▼
//!       ┌────────────┐ ┌────────────┐ ┌────────────┐
//!       │  Sessions  │ │   Memory   │ │   Tools    │
//!       └────────────┘ └────────────┘ └────────────┘
//! ```

mod context;
mod r#loop;

pub use context::{add_assistant_message, add_tool_result, ContextBuilder};
pub use r#loop::{strip_think, tool_hint, AgentLoop};
