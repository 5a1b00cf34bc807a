//! Two-tier long-term memory for AttoClaw
//!
//! The memory lives in the workspace `memory/` directory as two Markdown
//! files: `MEMORY.md`, the canonical fact store rewritten wholesale on
//! each consolidation, and `HISTORY.md`, an append-only log of timestamped
//! paragraphs suitable for substring search.
//!
//! Consolidation is LLM-driven: older session messages are formatted into
//! a transcript and handed to the model together with the current
//! `MEMORY.md`, and the model answers through a single `save_memory` tool
//! call carrying the new history paragraph and the rewritten fact store.
//! Consolidation never mutates `session.messages`; it only advances the
//! `last_consolidated` cursor.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::providers::{ChatOptions, LLMProvider, ToolDefinition};
use crate::session::{ChatMessage, Session};

/// Long-term fact store file name.
const MEMORY_FILE: &str = "MEMORY.md";
/// Append-only history log file name.
const HISTORY_FILE: &str = "HISTORY.md";

/// System instruction for the consolidation call.
const CONSOLIDATION_SYSTEM_PROMPT: &str = "\
You are a memory consolidation agent. You maintain the long-term memory of \
an AI assistant by distilling old conversation turns into durable notes.

Call the save_memory tool exactly once with two fields:
- history_entry: a 2-5 sentence paragraph summarizing the archived \
conversation, starting with a [YYYY-MM-DD HH:MM] timestamp.
- memory_update: the complete updated MEMORY.md contents. Keep every \
still-true fact, fold in new ones, and return the current contents \
unchanged if nothing new was learned.";

/// Store managing `MEMORY.md` and `HISTORY.md` plus the consolidation
/// protocol that feeds them.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    memory_dir: PathBuf,
}

impl MemoryStore {
    /// Create a store rooted at `<workspace>/memory/`.
    ///
    /// The directory is created lazily on first write.
    pub fn new(workspace: &Path) -> Self {
        Self {
            memory_dir: workspace.join("memory"),
        }
    }

    /// Path of the long-term fact store.
    pub fn memory_path(&self) -> PathBuf {
        self.memory_dir.join(MEMORY_FILE)
    }

    /// Path of the append-only history log.
    pub fn history_path(&self) -> PathBuf {
        self.memory_dir.join(HISTORY_FILE)
    }

    /// Read `MEMORY.md`, returning an empty string when absent.
    pub async fn read_long_term(&self) -> String {
        tokio::fs::read_to_string(self.memory_path())
            .await
            .unwrap_or_default()
    }

    /// Overwrite `MEMORY.md` with new content.
    pub async fn write_long_term(&self, content: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.memory_dir).await?;
        tokio::fs::write(self.memory_path(), content).await
    }

    /// Append one paragraph (plus a blank line) to `HISTORY.md`.
    pub async fn append_history(&self, entry: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.memory_dir).await?;
        let mut existing = tokio::fs::read_to_string(self.history_path())
            .await
            .unwrap_or_default();
        existing.push_str(entry.trim_end());
        existing.push_str("\n\n");
        tokio::fs::write(self.history_path(), existing).await
    }

    /// The memory block spliced into the system prompt, or an empty string
    /// when no long-term memory exists yet.
    pub async fn get_memory_context(&self) -> String {
        let content = self.read_long_term().await;
        if content.trim().is_empty() {
            String::new()
        } else {
            format!("## Long-term Memory\n{}", content)
        }
    }

    /// Definition of the `save_memory` tool advertised during consolidation.
    pub fn save_memory_tool() -> ToolDefinition {
        ToolDefinition::new(
            "save_memory",
            "Save the memory consolidation result to persistent storage.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "history_entry": {
                        "type": "string",
                        "description": "A paragraph (2-5 sentences) summarizing key events/decisions/topics. Start with [YYYY-MM-DD HH:MM]. Include detail useful for substring search."
                    },
                    "memory_update": {
                        "type": "string",
                        "description": "Full updated long-term memory as Markdown. Include all existing facts plus new ones. Return unchanged if nothing new."
                    }
                },
                "required": ["history_entry", "memory_update"]
            }),
        )
    }

    /// Consolidate older session messages into long-term memory.
    ///
    /// With `archive_all` every message is archived and the cursor resets
    /// to 0 (the `/new` path). Otherwise the newest `memory_window / 2`
    /// messages are kept unarchived and the cursor advances to the end of
    /// the archived slice.
    ///
    /// Returns `true` on success or when there was nothing to do; `false`
    /// when the LLM call failed, the response had no `save_memory` call,
    /// the arguments were malformed, or a file write failed. On `false`
    /// nothing is written and the cursor is unchanged. `session.messages`
    /// is never mutated.
    pub async fn consolidate(
        &self,
        session: &mut Session,
        provider: &dyn LLMProvider,
        model: Option<&str>,
        archive_all: bool,
        memory_window: usize,
    ) -> bool {
        let total = session.messages.len();

        let (slice, keep) = if archive_all {
            (&session.messages[..], 0)
        } else {
            let keep = memory_window / 2;
            if total <= keep || total.saturating_sub(session.last_consolidated) == 0 {
                return true;
            }
            let end = total - keep;
            if session.last_consolidated >= end {
                return true;
            }
            (&session.messages[session.last_consolidated..end], keep)
        };

        let lines: Vec<String> = slice.iter().filter_map(format_entry).collect();
        if lines.is_empty() {
            // Nothing with content to archive; still a success.
            if archive_all {
                session.last_consolidated = 0;
            } else {
                session.last_consolidated = total - keep;
            }
            return true;
        }

        let current_memory = self.read_long_term().await;
        let memory_block = if current_memory.trim().is_empty() {
            "(empty)".to_string()
        } else {
            current_memory.clone()
        };

        let prompt = format!(
            "Current MEMORY.md:\n{}\n\nConversation to archive:\n{}",
            memory_block,
            lines.join("\n")
        );

        let messages = vec![
            ChatMessage::system(CONSOLIDATION_SYSTEM_PROMPT),
            ChatMessage::user(&prompt),
        ];

        let response = match provider
            .chat(
                messages,
                vec![Self::save_memory_tool()],
                model,
                ChatOptions::new(),
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Consolidation LLM call failed");
                return false;
            }
        };

        let Some(call) = response.tool_calls.first() else {
            warn!("Consolidation response did not call save_memory");
            return false;
        };

        let args = call.arguments_value();
        if !args.is_object() {
            warn!("Consolidation tool arguments were not an object");
            return false;
        }

        if let Some(entry) = args.get("history_entry").and_then(|v| v.as_str()) {
            if !entry.trim().is_empty() {
                if let Err(e) = self.append_history(entry).await {
                    warn!(error = %e, "Failed to append HISTORY.md");
                    return false;
                }
            }
        }

        if let Some(update) = args.get("memory_update").and_then(|v| v.as_str()) {
            if update != current_memory {
                if let Err(e) = self.write_long_term(update).await {
                    warn!(error = %e, "Failed to write MEMORY.md");
                    return false;
                }
            }
        }

        session.last_consolidated = if archive_all { 0 } else { total - keep };
        debug!(
            key = %session.key,
            archived = lines.len(),
            cursor = session.last_consolidated,
            "Consolidation complete"
        );
        true
    }
}

/// Format one archived entry as `[<ts-minute>] <ROLE>[ [tools: ...]]: <content>`.
/// Entries with empty content are skipped.
fn format_entry(msg: &ChatMessage) -> Option<String> {
    let content = msg.content_text();
    if content.trim().is_empty() {
        return None;
    }

    let minute: String = msg
        .timestamp
        .as_deref()
        .unwrap_or("unknown")
        .chars()
        .take(16)
        .collect();

    let role = msg.role.to_string().to_uppercase();
    let tools = match &msg.tools_used {
        Some(names) if !names.is_empty() => format!(" [tools: {}]", names.join(", ")),
        _ => String::new(),
    };

    Some(format!("[{}] {}{}: {}", minute, role, tools, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AttoError, Result};
    use crate::providers::{LLMResponse, LLMToolCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scripted consolidation provider: answers every chat with the given
    /// response (or an error) and counts calls.
    struct MockConsolidator {
        response: Option<LLMResponse>,
        calls: AtomicUsize,
    }

    impl MockConsolidator {
        fn saving(history_entry: &str, memory_update: &str) -> Self {
            let call = LLMToolCall::new(
                "call_mem",
                "save_memory",
                json!({"history_entry": history_entry, "memory_update": memory_update}),
            );
            Self {
                response: Some(LLMResponse::with_tools(None, vec![call])),
                calls: AtomicUsize::new(0),
            }
        }

        fn silent() -> Self {
            Self {
                response: Some(LLMResponse::text("I decline to call tools.")),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LLMProvider for MockConsolidator {
        async fn chat(
            &self,
            _messages: Vec<ChatMessage>,
            _tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(r) => Ok(r.clone()),
                None => Err(AttoError::Provider("simulated outage".into())),
            }
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn session_with_turns(turns: usize) -> Session {
        let mut session = Session::new("cli:test");
        for i in 0..turns {
            let mut user = ChatMessage::user(&format!("question {}", i));
            user.timestamp = Some(format!("2026-08-02T10:{:02}:00", i));
            session.add_message(user);
            let mut reply = ChatMessage::assistant(Some(&format!("answer {}", i)));
            reply.timestamp = Some(format!("2026-08-02T10:{:02}:30", i));
            session.add_message(reply);
        }
        session
    }

    #[tokio::test]
    async fn test_read_long_term_absent() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        assert_eq!(store.read_long_term().await, "");
        assert_eq!(store.get_memory_context().await, "");
    }

    #[tokio::test]
    async fn test_write_and_context() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());

        store.write_long_term("- User prefers Rust").await.unwrap();
        let context = store.get_memory_context().await;
        assert!(context.starts_with("## Long-term Memory"));
        assert!(context.contains("prefers Rust"));
    }

    #[tokio::test]
    async fn test_append_history_accumulates() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());

        store
            .append_history("[2026-08-02 10:00] First paragraph.")
            .await
            .unwrap();
        store
            .append_history("[2026-08-02 11:00] Second paragraph.")
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(store.history_path()).await.unwrap();
        assert!(content.contains("First paragraph."));
        assert!(content.contains("Second paragraph."));
        // Paragraphs separated by a blank line
        assert!(content.contains(".\n\n["));
    }

    #[tokio::test]
    async fn test_consolidate_advances_cursor_and_writes_files() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        let provider =
            MockConsolidator::saving("[2026-08-02 10:00] Discussed Rust.", "- Likes Rust\n");

        let mut session = session_with_turns(10); // 20 messages
        let before = session.messages.clone();

        let ok = store
            .consolidate(&mut session, &provider, None, false, 10)
            .await;

        assert!(ok);
        // keep = 10/2 = 5, cursor = 20 - 5 = 15, strictly increased
        assert_eq!(session.last_consolidated, 15);
        // messages themselves untouched
        assert_eq!(session.messages, before);

        let memory = store.read_long_term().await;
        assert_eq!(memory, "- Likes Rust\n");
        let history = tokio::fs::read_to_string(store.history_path()).await.unwrap();
        assert!(history.contains("Discussed Rust."));
    }

    #[tokio::test]
    async fn test_consolidate_archive_all_resets_cursor() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        let provider = MockConsolidator::saving("[2026-08-02 10:00] Everything.", "- All\n");

        let mut session = session_with_turns(3);
        session.last_consolidated = 2;

        let ok = store
            .consolidate(&mut session, &provider, None, true, 10)
            .await;
        assert!(ok);
        assert_eq!(session.last_consolidated, 0);
        assert_eq!(session.messages.len(), 6);
    }

    #[tokio::test]
    async fn test_consolidate_noop_when_below_keep() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        let provider = MockConsolidator::saving("unused", "unused");

        let mut session = session_with_turns(2); // 4 messages, keep = 5
        let ok = store
            .consolidate(&mut session, &provider, None, false, 10)
            .await;

        assert!(ok);
        assert_eq!(session.last_consolidated, 0);
        // No LLM call for a no-op
        assert_eq!(provider.call_count(), 0);
        assert!(!store.memory_path().exists());
    }

    #[tokio::test]
    async fn test_consolidate_no_tool_call_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        let provider = MockConsolidator::silent();

        let mut session = session_with_turns(10);
        let ok = store
            .consolidate(&mut session, &provider, None, false, 10)
            .await;

        assert!(!ok);
        assert_eq!(session.last_consolidated, 0);
        assert!(!store.memory_path().exists());
        assert!(!store.history_path().exists());
    }

    #[tokio::test]
    async fn test_consolidate_provider_error_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        let provider = MockConsolidator::failing();

        let mut session = session_with_turns(10);
        let ok = store
            .consolidate(&mut session, &provider, None, false, 10)
            .await;

        assert!(!ok);
        assert_eq!(session.last_consolidated, 0);
    }

    #[tokio::test]
    async fn test_consolidate_accepts_string_encoded_arguments() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());

        let encoded = serde_json::Value::String(
            json!({"history_entry": "[2026-08-02 10:00] Encoded.", "memory_update": "- Fact\n"})
                .to_string(),
        );
        let provider = MockConsolidator {
            response: Some(LLMResponse::with_tools(
                None,
                vec![LLMToolCall::new("c1", "save_memory", encoded)],
            )),
            calls: AtomicUsize::new(0),
        };

        let mut session = session_with_turns(10);
        let ok = store
            .consolidate(&mut session, &provider, None, false, 10)
            .await;

        assert!(ok);
        assert_eq!(store.read_long_term().await, "- Fact\n");
    }

    #[tokio::test]
    async fn test_consolidate_unchanged_memory_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        store.write_long_term("- Stable fact\n").await.unwrap();

        let provider =
            MockConsolidator::saving("[2026-08-02 10:00] Nothing new.", "- Stable fact\n");
        let mtime_before = std::fs::metadata(store.memory_path()).unwrap().modified().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mut session = session_with_turns(10);
        assert!(
            store
                .consolidate(&mut session, &provider, None, false, 10)
                .await
        );

        let mtime_after = std::fs::metadata(store.memory_path()).unwrap().modified().unwrap();
        assert_eq!(mtime_before, mtime_after);
    }

    #[test]
    fn test_format_entry_shapes() {
        let mut msg = ChatMessage::assistant(Some("wrote the file"));
        msg.timestamp = Some("2026-08-02T10:15:42".to_string());
        msg.tools_used = Some(vec!["write_file".to_string(), "read_file".to_string()]);
        assert_eq!(
            format_entry(&msg).unwrap(),
            "[2026-08-02T10:15] ASSISTANT [tools: write_file, read_file]: wrote the file"
        );

        let mut plain = ChatMessage::user("hi");
        plain.timestamp = Some("2026-08-02T10:15:42".to_string());
        assert_eq!(format_entry(&plain).unwrap(), "[2026-08-02T10:15] USER: hi");

        let empty = ChatMessage::assistant(None);
        assert!(format_entry(&empty).is_none());
    }

    #[test]
    fn test_save_memory_tool_schema() {
        let tool = MemoryStore::save_memory_tool();
        assert_eq!(tool.name, "save_memory");
        let required = tool.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(tool.parameters["properties"]["history_entry"].is_object());
        assert!(tool.parameters["properties"]["memory_update"].is_object());
    }
}
