//! Agent loop implementation
//!
//! The `AgentLoop` consumes inbound messages from the bus, drives the
//! reason-act iteration against the LLM provider, executes tool calls,
//! persists each turn into the session store, and schedules background
//! memory consolidation under per-session locks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::error::{AttoError, Result};
use crate::memory::MemoryStore;
use crate::providers::{ChatOptions, LLMProvider, LLMToolCall};
use crate::session::{ChatMessage, MessageContent, Role, Session, SessionStore, ToolCallRecord};
use crate::tools::{MessageTool, Tool, ToolContext, ToolRegistry};

use super::context::{add_assistant_message, add_tool_result, ContextBuilder};

/// Poll interval for the inbound queue; doubles as the shutdown checkpoint.
const CONSUME_TIMEOUT: Duration = Duration::from_secs(1);

/// Persisted tool results are truncated beyond this many characters.
const TOOL_RESULT_LIMIT: usize = 500;

const NEW_SESSION_REPLY: &str = "New session started.";
const ARCHIVE_FAILED_REPLY: &str =
    "Memory archival failed, session not cleared. Please try again.";
const HELP_REPLY: &str = "Commands:\n\
    /new - archive this conversation to memory and start fresh\n\
    /help - show this help";

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>.*?</thinking>").expect("thinking regex"));

/// Remove `<thinking>...</thinking>` blocks and trim; `None` when nothing
/// remains.
pub fn strip_think(content: &str) -> Option<String> {
    let stripped = THINK_RE.replace_all(content, "");
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Short user-facing annotation for a batch of tool calls, e.g.
/// `read_file("README"), web_search("rust a…")`.
///
/// Shows the first argument when it is a string, in declaration order
/// (serde_json is built with `preserve_order`); otherwise just the name.
pub fn tool_hint(calls: &[LLMToolCall]) -> String {
    calls
        .iter()
        .map(|call| {
            let args = call.arguments_value();
            let first_string = args
                .as_object()
                .and_then(|map| map.values().next())
                .and_then(|v| v.as_str().map(str::to_string));
            match first_string {
                Some(arg) => {
                    let shown: String = arg.chars().take(40).collect();
                    if arg.chars().count() > 40 {
                        format!("{}(\"{}…\")", call.name, shown)
                    } else {
                        format!("{}(\"{}\")", call.name, shown)
                    }
                }
                None => call.name.clone(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Append this turn's new messages to the session.
///
/// Drops `reasoning_content` (provider-specific, not worth persisting),
/// truncates oversized tool results, stamps missing timestamps, and
/// derives `tools_used` on assistant entries from their own tool calls.
fn save_turn(session: &mut Session, new_messages: &[ChatMessage]) {
    for msg in new_messages {
        let mut msg = msg.clone();
        msg.reasoning_content = None;

        if msg.role == Role::Tool {
            if let Some(MessageContent::Text(text)) = &msg.content {
                if text.chars().count() > TOOL_RESULT_LIMIT {
                    let truncated: String = text.chars().take(TOOL_RESULT_LIMIT).collect();
                    msg.content = Some(MessageContent::Text(format!(
                        "{}\n... (truncated)",
                        truncated
                    )));
                }
            }
        }

        if msg.timestamp.is_none() {
            msg.timestamp = Some(Local::now().format("%Y-%m-%dT%H:%M:%S").to_string());
        }

        if msg.role == Role::Assistant {
            if let Some(calls) = &msg.tool_calls {
                if !calls.is_empty() {
                    msg.tools_used =
                        Some(calls.iter().map(|c| c.function.name.clone()).collect());
                }
            }
        }

        session.add_message(msg);
    }
}

/// Per-key consolidation lock with a refcount for garbage collection.
struct KeyLock {
    mutex: Arc<Mutex<()>>,
    refs: usize,
}

/// The main agent loop coordinating bus, provider, tools, sessions and
/// memory.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use attoclaw::agent::AgentLoop;
/// use attoclaw::bus::MessageBus;
/// use attoclaw::config::Config;
/// use attoclaw::session::SessionStore;
///
/// let config = Config::default();
/// let sessions = SessionStore::new_memory();
/// let bus = Arc::new(MessageBus::new());
/// let agent = AgentLoop::new(config, sessions, bus);
///
/// agent.set_provider(Box::new(my_provider)).await;
/// agent.register_default_tools().await;
/// agent.run().await?;
/// ```
pub struct AgentLoop {
    config: Config,
    sessions: SessionStore,
    memory: MemoryStore,
    bus: Arc<MessageBus>,
    /// The LLM provider (Arc<dyn ..> allows cloning out without holding the lock)
    provider: Arc<RwLock<Option<Arc<dyn LLMProvider>>>>,
    tools: Arc<RwLock<ToolRegistry>>,
    context_builder: ContextBuilder,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    /// Session keys with a consolidation currently in flight
    consolidating: Arc<Mutex<HashSet<String>>>,
    /// Per-key consolidation locks, reaped when no task holds them
    consolidation_locks: Arc<Mutex<HashMap<String, KeyLock>>>,
    /// Live consolidation tasks, awaited before the loop exits
    consolidation_tasks: Arc<Mutex<JoinSet<()>>>,
    /// Set by the message tool when it delivered during the current turn
    sent_in_turn: Arc<AtomicBool>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(config: Config, sessions: SessionStore, bus: Arc<MessageBus>) -> Self {
        let workspace = config.workspace_path();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            memory: MemoryStore::new(&workspace),
            context_builder: ContextBuilder::new(&workspace),
            config,
            sessions,
            bus,
            provider: Arc::new(RwLock::new(None)),
            tools: Arc::new(RwLock::new(ToolRegistry::new())),
            running: AtomicBool::new(false),
            shutdown_tx,
            consolidating: Arc::new(Mutex::new(HashSet::new())),
            consolidation_locks: Arc::new(Mutex::new(HashMap::new())),
            consolidation_tasks: Arc::new(Mutex::new(JoinSet::new())),
            sent_in_turn: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the agent loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the LLM provider to use.
    pub async fn set_provider(&self, provider: Box<dyn LLMProvider>) {
        let mut p = self.provider.write().await;
        *p = Some(Arc::from(provider));
    }

    /// Register a tool with the agent.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.register(tool);
    }

    /// Register the built-in `message` tool wired to this loop's bus and
    /// reply-suppression flag.
    pub async fn register_default_tools(&self) {
        let tool = MessageTool::new(Arc::clone(&self.bus), Arc::clone(&self.sent_in_turn));
        self.register_tool(Box::new(tool)).await;
    }

    /// The number of registered tools.
    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Check if a tool is registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.has(name)
    }

    /// Get a reference to the session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Get a reference to the memory store.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Get a reference to the message bus.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the agent loop, consuming from the message bus until stopped.
    ///
    /// Polls the inbound queue with a 1-second timeout so the shutdown
    /// signal is observed between messages. Pending background
    /// consolidations are awaited before this returns.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AttoError::Config("Agent loop already running".into()));
        }
        info!("Starting agent loop");

        // Subscribe fresh and consume any stale stop signal from a previous run.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                polled = self.bus.consume_inbound(CONSUME_TIMEOUT) => {
                    match polled {
                        Ok(Some(msg)) => self.handle_inbound(msg).await,
                        Ok(None) => {}
                        Err(_) => {
                            info!("Inbound queue closed");
                            break;
                        }
                    }
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
        }

        self.wait_for_consolidations().await;
        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    /// Stop the agent loop after any in-progress message completes.
    pub fn stop(&self) {
        info!("Stopping agent loop");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    /// Await every background consolidation task currently in flight.
    pub async fn wait_for_consolidations(&self) {
        let mut tasks = self.consolidation_tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    async fn handle_inbound(&self, msg: InboundMessage) {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "request",
            request_id = %request_id,
            session = %msg.session_key(),
            channel = %msg.channel,
            chat_id = %msg.chat_id,
            sender = %msg.sender_id,
        );

        async {
            info!("Processing message");
            let start = Instant::now();

            match self.process_message(&msg).await {
                Ok(Some(outbound)) => {
                    info!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        response_len = outbound.content.len(),
                        "Request completed"
                    );
                    if let Err(e) = self.bus.publish_outbound(outbound) {
                        error!(error = %e, "Failed to publish outbound message");
                    }
                }
                Ok(None) => {
                    info!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Request completed without default reply"
                    );
                    // Interactive CLI adapters block on a read; an empty
                    // outbound unblocks them.
                    if msg.channel == "cli" {
                        if let Err(e) = self.bus.publish_outbound(OutboundMessage::reply_to(&msg, ""))
                        {
                            error!(error = %e, "Failed to publish empty CLI outbound");
                        }
                    }
                }
                Err(e) => {
                    error!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        error = %e,
                        "Request failed"
                    );
                    let apology = OutboundMessage::reply_to(
                        &msg,
                        &format!("Sorry, I encountered an error: {}", e),
                    );
                    if let Err(publish_err) = self.bus.publish_outbound(apology) {
                        error!(error = %publish_err, "Failed to publish error message");
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Process a single inbound message.
    ///
    /// Returns the outbound reply, or `None` when the turn delivered its
    /// own output through the `message` tool.
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<Option<OutboundMessage>> {
        // Clone the provider Arc early and release the RwLock immediately,
        // so set_provider() is not blocked across multi-second LLM calls.
        let provider = {
            let guard = self.provider.read().await;
            Arc::clone(
                guard
                    .as_ref()
                    .ok_or_else(|| AttoError::Provider("No provider configured".into()))?,
            )
        };

        let key = msg.session_key();
        let mut session = self.sessions.get_or_create(&key).await?;

        let memory_window = self.config.agent.memory_window;
        let model = self.config.agent.model.clone();

        let command = msg.content.trim().to_lowercase();
        match command.as_str() {
            "/new" => {
                let archived = self
                    .memory
                    .consolidate(&mut session, provider.as_ref(), Some(&model), true, memory_window)
                    .await;
                if !archived {
                    return Ok(Some(OutboundMessage::reply_to(msg, ARCHIVE_FAILED_REPLY)));
                }
                session.clear();
                self.sessions.save(&session).await?;
                self.sessions.invalidate(&session.key).await;
                return Ok(Some(OutboundMessage::reply_to(msg, NEW_SESSION_REPLY)));
            }
            "/help" => return Ok(Some(OutboundMessage::reply_to(msg, HELP_REPLY))),
            _ => {}
        }

        if session.unconsolidated_count() >= memory_window {
            self.spawn_consolidation(&key, Arc::clone(&provider)).await;
        }

        let workspace = self.config.workspace_path();
        let mut tool_ctx = ToolContext::new()
            .with_channel(&msg.channel, &msg.chat_id)
            .with_workspace(&workspace.to_string_lossy());
        if let Some(message_id) = msg.message_id() {
            tool_ctx = tool_ctx.with_message_id(&message_id);
        }

        let history = session.get_history(memory_window);
        let initial = self
            .context_builder
            .build_messages(&history, &msg.content, &msg.media, &msg.channel, &msg.chat_id)
            .await;

        self.sent_in_turn.store(false, Ordering::SeqCst);

        let bus = Arc::clone(&self.bus);
        let channel = msg.channel.clone();
        let chat_id = msg.chat_id.clone();
        let progress = move |content: &str, is_hint: bool| {
            let outbound = if is_hint {
                OutboundMessage::tool_hint(&channel, &chat_id, content)
            } else {
                OutboundMessage::progress(&channel, &chat_id, content)
            };
            if let Err(e) = bus.publish_outbound(outbound) {
                warn!(error = %e, "Failed to publish progress message");
            }
        };

        let (final_content, tools_used, all_msgs) = self
            .run_agent_loop(provider, initial, &tool_ctx, Some(&progress))
            .await?;
        debug!(tools = tools_used.len(), "Turn finished");

        // A background consolidation may have advanced the cursor while
        // this turn was in flight; keep the newest value before saving.
        let current = self.sessions.get_or_create(&session.key).await?;
        session.last_consolidated = session.last_consolidated.max(current.last_consolidated);

        let skip = 1 + history.len();
        save_turn(&mut session, &all_msgs[skip..]);
        self.sessions.save(&session).await?;

        if self.sent_in_turn.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(OutboundMessage::reply_to(msg, &final_content)))
    }

    /// Drive the reason-act iteration until the model answers without
    /// tool calls or the iteration cap is reached.
    ///
    /// Returns the final content (the fixed apology when the cap was hit),
    /// the names of tools invoked in order, and the full message list
    /// including every assistant/tool entry appended along the way.
    pub async fn run_agent_loop(
        &self,
        provider: Arc<dyn LLMProvider>,
        mut messages: Vec<ChatMessage>,
        tool_ctx: &ToolContext,
        on_progress: Option<&(dyn Fn(&str, bool) + Send + Sync)>,
    ) -> Result<(String, Vec<String>, Vec<ChatMessage>)> {
        let max_iterations = self.config.agent.max_tool_iterations;
        let model = Some(self.config.agent.model.as_str());
        let options = ChatOptions::new()
            .with_max_tokens(self.config.agent.max_tokens)
            .with_temperature(self.config.agent.temperature);

        let mut tools_used = Vec::new();
        let mut final_content: Option<String> = None;
        let mut iteration = 0u32;

        while iteration < max_iterations {
            iteration += 1;

            let tool_definitions = {
                let tools = self.tools.read().await;
                tools.definitions()
            };

            // Provider lock is NOT held during this await.
            let response = provider
                .chat(messages.clone(), tool_definitions, model, options.clone())
                .await?;

            if response.has_tool_calls() {
                debug!(
                    iteration,
                    max_iterations,
                    calls = response.tool_calls.len(),
                    "Tool iteration"
                );

                if let Some(callback) = on_progress {
                    if let Some(clean) = strip_think(response.content.as_deref().unwrap_or("")) {
                        callback(&clean, false);
                    }
                    callback(&tool_hint(&response.tool_calls), true);
                }

                let records: Vec<ToolCallRecord> = response
                    .tool_calls
                    .iter()
                    .map(|tc| ToolCallRecord::new(&tc.id, &tc.name, &tc.arguments_json()))
                    .collect();
                add_assistant_message(
                    &mut messages,
                    response.content.as_deref(),
                    records,
                    response.reasoning_content.as_deref(),
                );

                for call in &response.tool_calls {
                    info!(tool = %call.name, id = %call.id, "Executing tool");
                    tools_used.push(call.name.clone());
                    let result = {
                        let tools = self.tools.read().await;
                        tools.execute(&call.name, call.arguments_value(), tool_ctx).await
                    };
                    add_tool_result(&mut messages, &call.id, &call.name, &result);
                }
            } else {
                final_content = strip_think(response.content.as_deref().unwrap_or(""));
                break;
            }
        }

        let final_content = final_content.unwrap_or_else(|| {
            format!(
                "I reached the maximum number of tool call iterations ({}) without \
                 completing the task. You can try breaking the task into smaller steps.",
                max_iterations
            )
        });

        Ok((final_content, tools_used, messages))
    }

    /// Schedule a background consolidation for `key` unless one is already
    /// in flight. The foreground turn continues immediately.
    async fn spawn_consolidation(&self, key: &str, provider: Arc<dyn LLMProvider>) {
        {
            let mut consolidating = self.consolidating.lock().await;
            if !consolidating.insert(key.to_string()) {
                return;
            }
        }

        let lock = {
            let mut locks = self.consolidation_locks.lock().await;
            let entry = locks.entry(key.to_string()).or_insert_with(|| KeyLock {
                mutex: Arc::new(Mutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.mutex)
        };

        let key = key.to_string();
        let sessions = self.sessions.clone();
        let memory = self.memory.clone();
        let consolidating = Arc::clone(&self.consolidating);
        let locks = Arc::clone(&self.consolidation_locks);
        let model = self.config.agent.model.clone();
        let memory_window = self.config.agent.memory_window;

        info!(session = %key, "Scheduling background consolidation");
        let mut tasks = self.consolidation_tasks.lock().await;
        tasks.spawn(async move {
            {
                let _guard = lock.lock().await;
                match sessions.get_or_create(&key).await {
                    Ok(mut snapshot) => {
                        let consolidated = memory
                            .consolidate(
                                &mut snapshot,
                                provider.as_ref(),
                                Some(&model),
                                false,
                                memory_window,
                            )
                            .await;
                        if consolidated {
                            // Apply the cursor to the freshest session state;
                            // the foreground may have appended a turn meanwhile.
                            match sessions.get_or_create(&key).await {
                                Ok(mut latest) => {
                                    latest.last_consolidated = latest
                                        .last_consolidated
                                        .max(snapshot.last_consolidated);
                                    if let Err(e) = sessions.save(&latest).await {
                                        warn!(session = %key, error = %e, "Failed to save consolidated session");
                                    }
                                }
                                Err(e) => {
                                    warn!(session = %key, error = %e, "Failed to reload session after consolidation");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(session = %key, error = %e, "Failed to load session for consolidation");
                    }
                }
            }

            consolidating.lock().await.remove(&key);
            let mut locks = locks.lock().await;
            let unused = match locks.get_mut(&key) {
                Some(entry) => {
                    entry.refs -= 1;
                    entry.refs == 0
                }
                None => false,
            };
            if unused {
                locks.remove(&key);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_agent() -> AgentLoop {
        let config = Config::default();
        let sessions = SessionStore::new_memory();
        let bus = Arc::new(MessageBus::new());
        AgentLoop::new(config, sessions, bus)
    }

    // ── strip_think ────────────────────────────────────────────────────

    #[test]
    fn test_strip_think_removes_blocks() {
        let input = "<thinking>hmm\nmultiline</thinking>Hello<thinking>more</thinking> world";
        assert_eq!(strip_think(input), Some("Hello world".to_string()));
    }

    #[test]
    fn test_strip_think_empty_result() {
        assert_eq!(strip_think("<thinking>only thoughts</thinking>"), None);
        assert_eq!(strip_think("   "), None);
        assert_eq!(strip_think(""), None);
    }

    #[test]
    fn test_strip_think_idempotent() {
        let inputs = [
            "<thinking>a</thinking>answer",
            "plain text",
            "<thinking>x</thinking>",
            "  spaced  ",
        ];
        for input in inputs {
            let once = strip_think(input);
            let twice = once.as_deref().and_then(strip_think);
            assert_eq!(once, twice, "strip_think not idempotent for {:?}", input);
        }
    }

    // ── tool_hint ──────────────────────────────────────────────────────

    #[test]
    fn test_tool_hint_string_arg() {
        let calls = vec![LLMToolCall::new("c1", "read_file", json!({"path": "README"}))];
        assert_eq!(tool_hint(&calls), "read_file(\"README\")");
    }

    #[test]
    fn test_tool_hint_truncates_long_arg() {
        let long = "x".repeat(60);
        let calls = vec![LLMToolCall::new("c1", "write_file", json!({"path": long}))];
        let hint = tool_hint(&calls);
        assert!(hint.starts_with("write_file(\""));
        assert!(hint.ends_with("…\")"));
        assert!(hint.contains(&"x".repeat(40)));
        assert!(!hint.contains(&"x".repeat(41)));
    }

    #[test]
    fn test_tool_hint_no_string_arg() {
        let calls = vec![LLMToolCall::new("c1", "list_dir", json!({"depth": 2}))];
        assert_eq!(tool_hint(&calls), "list_dir");
    }

    #[test]
    fn test_tool_hint_multi_key_uses_first_declared() {
        // "content" sorts before "path"; declaration order must win so the
        // hint shows the path, not the file body.
        let calls = vec![LLMToolCall::new(
            "c1",
            "write_file",
            json!({"path": "notes.txt", "content": "a long document body that must not leak"}),
        )];
        assert_eq!(tool_hint(&calls), "write_file(\"notes.txt\")");
    }

    #[test]
    fn test_tool_hint_first_value_not_string() {
        // Only the first declared argument is eligible; a string later in
        // the object does not get promoted into the hint.
        let calls = vec![LLMToolCall::new(
            "c1",
            "resize",
            json!({"width": 640, "label": "thumbnail"}),
        )];
        assert_eq!(tool_hint(&calls), "resize");
    }

    #[test]
    fn test_tool_hint_joins_multiple() {
        let calls = vec![
            LLMToolCall::new("c1", "read_file", json!({"path": "a.txt"})),
            LLMToolCall::new("c2", "noop", json!({})),
        ];
        assert_eq!(tool_hint(&calls), "read_file(\"a.txt\"), noop");
    }

    // ── save_turn ──────────────────────────────────────────────────────

    #[test]
    fn test_save_turn_truncates_tool_results() {
        let mut session = Session::new("test");
        let long = "y".repeat(600);
        let msgs = vec![
            ChatMessage::user("hi"),
            ChatMessage::tool_result("c1", "read_file", &long),
        ];
        save_turn(&mut session, &msgs);

        let stored = session.messages[1].content_text();
        assert!(stored.ends_with("\n... (truncated)"));
        assert!(stored.starts_with(&"y".repeat(500)));
        assert!(!stored.contains(&"y".repeat(501)));
    }

    #[test]
    fn test_save_turn_stamps_timestamps() {
        let mut session = Session::new("test");
        save_turn(&mut session, &[ChatMessage::user("hi")]);
        assert!(session.messages[0].timestamp.is_some());
    }

    #[test]
    fn test_save_turn_drops_reasoning_and_derives_tools_used() {
        let mut session = Session::new("test");
        let assistant = ChatMessage::assistant_with_tools(
            Some("working"),
            vec![
                ToolCallRecord::new("c1", "read_file", "{}"),
                ToolCallRecord::new("c2", "web_search", "{}"),
            ],
            Some("secret reasoning"),
        );
        save_turn(&mut session, &[assistant]);

        let stored = &session.messages[0];
        assert!(stored.reasoning_content.is_none());
        assert_eq!(
            stored.tools_used,
            Some(vec!["read_file".to_string(), "web_search".to_string()])
        );
    }

    #[test]
    fn test_save_turn_preserves_existing_timestamp() {
        let mut session = Session::new("test");
        let mut msg = ChatMessage::user("hi");
        msg.timestamp = Some("2026-01-01T00:00:00".to_string());
        save_turn(&mut session, &[msg]);
        assert_eq!(
            session.messages[0].timestamp.as_deref(),
            Some("2026-01-01T00:00:00")
        );
    }

    // ── loop lifecycle ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_agent_loop_creation() {
        let agent = make_agent();
        assert!(!agent.is_running());
        assert_eq!(agent.tool_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_default_tools() {
        let agent = make_agent();
        agent.register_default_tools().await;
        assert!(agent.has_tool("message").await);
    }

    #[tokio::test]
    async fn test_process_message_no_provider() {
        let agent = make_agent();
        let msg = InboundMessage::new("test", "user123", "chat456", "Hello");
        let result = agent.process_message(&msg).await;

        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, AttoError::Provider(_)));
        assert!(err.to_string().contains("No provider configured"));
    }

    #[tokio::test]
    async fn test_agent_loop_start_stop() {
        let agent = Arc::new(make_agent());

        let agent_clone = Arc::clone(&agent);
        let handle = tokio::spawn(async move { agent_clone.run().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(agent.is_running());

        agent.stop();
        let result = tokio::time::timeout(Duration::from_millis(200), handle).await;
        assert!(result.is_ok());
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_agent_loop_double_start() {
        let agent = Arc::new(make_agent());

        let agent_clone = Arc::clone(&agent);
        let handle = tokio::spawn(async move { agent_clone.run().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = agent.run().await;
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("already running"));

        agent.stop();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
    }

    #[tokio::test]
    async fn test_agent_loop_can_restart_after_stop() {
        let agent = Arc::new(make_agent());

        let agent_clone = Arc::clone(&agent);
        let first = tokio::spawn(async move { agent_clone.run().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        agent.stop();
        assert!(tokio::time::timeout(Duration::from_millis(200), first)
            .await
            .is_ok());

        let agent_clone = Arc::clone(&agent);
        let second = tokio::spawn(async move { agent_clone.run().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(agent.is_running());
        agent.stop();
        assert!(tokio::time::timeout(Duration::from_millis(200), second)
            .await
            .is_ok());
    }
}
