//! Session module - conversation state persistence
//!
//! Sessions are persisted as line-delimited JSON, one file per session key:
//! line 1 is a metadata envelope, lines 2..N are the chat messages in
//! order. The append-only format keeps provider prefix-caching effective
//! across turns; the consolidation cursor in the envelope provides a
//! logical window without touching the physical sequence.
//!
//! # Example
//!
//! ```
//! use attoclaw::session::{SessionStore, ChatMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionStore::new_memory();
//!
//!     let mut session = store.get_or_create("telegram:chat123").await.unwrap();
//!     session.add_message(ChatMessage::user("Hello!"));
//!     session.add_message(ChatMessage::assistant(Some("Hi there!")));
//!
//!     store.save(&session).await.unwrap();
//! }
//! ```

pub mod types;

pub use types::{
    ChatMessage, ContentPart, FunctionCall, ImageUrl, MessageContent, Role, Session,
    ToolCallRecord,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AttoError, Result};

/// Session file extension.
const SESSION_EXT: &str = "jsonl";

/// First line of every session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionEnvelope {
    #[serde(rename = "_type")]
    kind: String,
    key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    #[serde(default)]
    last_consolidated: usize,
}

impl SessionEnvelope {
    fn from_session(session: &Session) -> Self {
        Self {
            kind: "metadata".to_string(),
            key: session.key.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            metadata: session.metadata.clone(),
            last_consolidated: session.last_consolidated,
        }
    }
}

/// Listing entry produced by [`SessionStore::list_sessions`]; built from the
/// metadata line alone, without parsing message bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Original session key
    pub key: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last modified
    pub updated_at: DateTime<Utc>,
    /// Consolidation cursor at last save
    pub last_consolidated: usize,
}

/// Store for conversation sessions with an in-memory cache and optional
/// file persistence.
///
/// Safe to clone and share across tasks; clones see the same cache.
pub struct SessionStore {
    /// In-memory cache of sessions
    cache: Arc<RwLock<HashMap<String, Session>>>,
    /// Directory for file-based persistence; `None` for memory-only stores
    storage_path: Option<PathBuf>,
    /// Directory checked once per key for pre-migration session files
    legacy_path: Option<PathBuf>,
}

impl SessionStore {
    /// Create a session store persisting under `dir`.
    ///
    /// The directory is created if it doesn't exist. Sessions left behind
    /// by earlier installations under `~/.nanobot/sessions/` are migrated
    /// into `dir` lazily, on first access of their key.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let legacy = dirs::home_dir().map(|h| h.join(".nanobot").join("sessions"));
        Ok(Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(dir),
            legacy_path: legacy,
        })
    }

    /// Create an in-memory store without persistence.
    ///
    /// Useful for tests and ephemeral sessions.
    pub fn new_memory() -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
            legacy_path: None,
        }
    }

    /// Override the legacy migration directory (builder pattern).
    pub fn with_legacy_dir(mut self, dir: PathBuf) -> Self {
        self.legacy_path = Some(dir);
        self
    }

    /// Get an existing session or create a new empty one.
    ///
    /// Resolution order: in-memory cache, primary session file, legacy
    /// location (moved into the primary directory on hit), fresh session.
    /// A failed migration or an unreadable file falls through to a fresh
    /// session rather than failing the turn.
    pub async fn get_or_create(&self, key: &str) -> Result<Session> {
        {
            let cache = self.cache.read().await;
            if let Some(session) = cache.get(key) {
                return Ok(session.clone());
            }
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(Self::file_name(key));

            if !file_path.exists() {
                self.try_migrate_legacy(key, &file_path).await;
            }

            if file_path.exists() {
                match Self::load_file(&file_path).await {
                    Ok(session) => {
                        let mut cache = self.cache.write().await;
                        cache.insert(key.to_string(), session.clone());
                        return Ok(session);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Session file unreadable, starting fresh");
                    }
                }
            }
        }

        let session = Session::new(key);
        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Save a session to the cache and (when persistence is enabled) to
    /// disk, atomically via write-then-rename.
    pub async fn save(&self, session: &Session) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            cache.insert(session.key.clone(), session.clone());
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(Self::file_name(&session.key));
            let tmp_path = file_path.with_extension(format!("{}.tmp", SESSION_EXT));

            let mut lines = Vec::with_capacity(session.messages.len() + 1);
            lines.push(serde_json::to_string(&SessionEnvelope::from_session(
                session,
            ))?);
            for msg in &session.messages {
                lines.push(serde_json::to_string(msg)?);
            }
            let mut content = lines.join("\n");
            content.push('\n');

            tokio::fs::write(&tmp_path, content).await?;
            tokio::fs::rename(&tmp_path, &file_path).await?;
        }

        Ok(())
    }

    /// Remove a session from the cache. The file, if any, is untouched.
    pub async fn invalidate(&self, key: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key);
    }

    /// List persisted sessions, newest first.
    ///
    /// Only the metadata line of each file is read.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();

        let Some(ref storage_path) = self.storage_path else {
            return Ok(summaries);
        };

        let mut entries = tokio::fs::read_dir(storage_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == SESSION_EXT) != Some(true) {
                continue;
            }

            match Self::read_envelope(&path).await {
                Ok(envelope) => summaries.push(SessionSummary {
                    key: envelope.key,
                    created_at: envelope.created_at,
                    updated_at: envelope.updated_at,
                    last_consolidated: envelope.last_consolidated,
                }),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable session file");
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Number of sessions currently cached.
    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn try_migrate_legacy(&self, key: &str, target: &Path) {
        let Some(ref legacy_dir) = self.legacy_path else {
            return;
        };
        let legacy_file = legacy_dir.join(Self::file_name(key));
        if !legacy_file.exists() {
            return;
        }

        debug!(key = %key, from = %legacy_file.display(), "Migrating legacy session file");
        if let Err(e) = tokio::fs::rename(&legacy_file, target).await {
            // Rename fails across filesystems; fall back to copy + remove.
            let copied = tokio::fs::copy(&legacy_file, target).await;
            match copied {
                Ok(_) => {
                    let _ = tokio::fs::remove_file(&legacy_file).await;
                }
                Err(copy_err) => {
                    warn!(
                        key = %key,
                        rename_error = %e,
                        copy_error = %copy_err,
                        "Legacy session migration failed"
                    );
                }
            }
        }
    }

    async fn read_envelope(path: &Path) -> Result<SessionEnvelope> {
        let file = tokio::fs::File::open(path).await?;
        let mut reader = tokio::io::BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        let envelope: SessionEnvelope = serde_json::from_str(line.trim())?;
        if envelope.kind != "metadata" {
            return Err(AttoError::Session(format!(
                "Session file {} has no metadata envelope",
                path.display()
            )));
        }
        Ok(envelope)
    }

    async fn load_file(path: &Path) -> Result<Session> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());

        let envelope_line = lines
            .next()
            .ok_or_else(|| AttoError::Session(format!("Empty session file {}", path.display())))?;
        let envelope: SessionEnvelope = serde_json::from_str(envelope_line)?;
        if envelope.kind != "metadata" {
            return Err(AttoError::Session(format!(
                "Session file {} has no metadata envelope",
                path.display()
            )));
        }

        let mut messages = Vec::new();
        for line in lines {
            messages.push(serde_json::from_str::<ChatMessage>(line)?);
        }

        let last_consolidated = envelope.last_consolidated.min(messages.len());
        Ok(Session {
            key: envelope.key,
            messages,
            created_at: envelope.created_at,
            updated_at: envelope.updated_at,
            metadata: envelope.metadata,
            last_consolidated,
        })
    }

    /// Map a session key to its on-disk file name: `:` becomes `_`, then
    /// path separators, control characters and other filesystem-hostile
    /// characters are dropped, and reserved device names are prefixed.
    fn file_name(key: &str) -> String {
        format!("{}.{}", Self::sanitize_key(key), SESSION_EXT)
    }

    fn sanitize_key(key: &str) -> String {
        const RESERVED: &[&str] = &[
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];

        let mut out = String::with_capacity(key.len());
        for c in key.chars() {
            match c {
                ':' => out.push('_'),
                '/' | '\\' | '<' | '>' | '"' | '|' | '?' | '*' => {}
                c if c.is_control() => {}
                c => out.push(c),
            }
        }

        let out = out.trim_start_matches('.').to_string();
        if out.is_empty() || RESERVED.contains(&out.to_uppercase().as_str()) {
            format!("session_{}", out)
        } else {
            out
        }
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            storage_path: self.storage_path.clone(),
            legacy_path: self.legacy_path.clone(),
        }
    }
}

impl Default for SessionStore {
    /// Creates an in-memory store. Use `SessionStore::new()` for persistence.
    fn default() -> Self {
        Self::new_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::new(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_retrieve() {
        let store = SessionStore::new_memory();
        let session = store.get_or_create("test-session").await.unwrap();
        assert!(session.messages.is_empty());
        assert_eq!(session.key, "test-session");
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut session = store.get_or_create("cli:direct").await.unwrap();
        session.add_message(ChatMessage::user("Hello"));
        session.add_message(ChatMessage::assistant_with_tools(
            Some("Let me check."),
            vec![ToolCallRecord::new("call_1", "search", r#"{"q":"rust"}"#)],
            None,
        ));
        session.add_message(ChatMessage::tool_result("call_1", "search", "Found it"));
        session.add_message(ChatMessage::assistant(Some("Done")));
        session.last_consolidated = 1;
        store.save(&session).await.unwrap();

        // Force a disk read
        store.invalidate("cli:direct").await;
        let loaded = store.get_or_create("cli:direct").await.unwrap();

        assert_eq!(loaded.messages, session.messages);
        assert_eq!(loaded.last_consolidated, 1);
        assert_eq!(loaded.key, "cli:direct");
    }

    #[tokio::test]
    async fn test_file_layout_is_jsonl_with_envelope() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut session = store.get_or_create("cli:direct").await.unwrap();
        session.add_message(ChatMessage::user("Hello"));
        store.save(&session).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("cli_direct.jsonl")).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let envelope: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(envelope["_type"], "metadata");
        assert_eq!(envelope["key"], "cli:direct");
        assert_eq!(envelope["last_consolidated"], 0);

        let msg: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(msg["role"], "user");
    }

    #[tokio::test]
    async fn test_invalidate_removes_cache_only() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut session = store.get_or_create("cli:direct").await.unwrap();
        session.add_message(ChatMessage::user("persist me"));
        store.save(&session).await.unwrap();

        store.invalidate("cli:direct").await;
        assert_eq!(store.cache_size().await, 0);

        let reloaded = store.get_or_create("cli:direct").await.unwrap();
        assert_eq!(reloaded.message_count(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_yields_fresh_session() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        std::fs::write(dir.path().join("cli_direct.jsonl"), "not json\n").unwrap();
        let session = store.get_or_create("cli:direct").await.unwrap();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_sorted_by_updated_at() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for key in ["cli:a", "cli:b", "cli:c"] {
            let mut session = store.get_or_create(key).await.unwrap();
            session.add_message(ChatMessage::user("hi"));
            store.save(&session).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let summaries = store.list_sessions().await.unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].key, "cli:c");
        assert_eq!(summaries[2].key, "cli:a");
    }

    #[tokio::test]
    async fn test_legacy_migration() {
        let primary = TempDir::new().unwrap();
        let legacy = TempDir::new().unwrap();

        // Plant a session file in the legacy location
        let legacy_store = SessionStore::new(legacy.path().to_path_buf()).unwrap();
        let mut session = legacy_store.get_or_create("telegram:42").await.unwrap();
        session.add_message(ChatMessage::user("old message"));
        legacy_store.save(&session).await.unwrap();

        let store = SessionStore::new(primary.path().to_path_buf())
            .unwrap()
            .with_legacy_dir(legacy.path().to_path_buf());

        let migrated = store.get_or_create("telegram:42").await.unwrap();
        assert_eq!(migrated.message_count(), 1);
        assert_eq!(migrated.messages[0].content_text(), "old message");

        // File moved, not copied
        assert!(primary.path().join("telegram_42.jsonl").exists());
        assert!(!legacy.path().join("telegram_42.jsonl").exists());
    }

    #[tokio::test]
    async fn test_missing_legacy_creates_fresh() {
        let primary = TempDir::new().unwrap();
        let store = SessionStore::new(primary.path().to_path_buf())
            .unwrap()
            .with_legacy_dir(PathBuf::from("/nonexistent/legacy"));

        let session = store.get_or_create("telegram:42").await.unwrap();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_store_clone_shares_cache() {
        let store1 = SessionStore::new_memory();
        let store2 = store1.clone();

        let mut session = store1.get_or_create("shared").await.unwrap();
        session.add_message(ChatMessage::user("Test"));
        store1.save(&session).await.unwrap();

        let loaded = store2.get_or_create("shared").await.unwrap();
        assert_eq!(loaded.message_count(), 1);
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(SessionStore::sanitize_key("cli:direct"), "cli_direct");
        assert_eq!(
            SessionStore::sanitize_key("telegram:chat/123"),
            "telegram_chat123"
        );
        assert_eq!(SessionStore::sanitize_key("a\\b|c?d*e"), "abcde");
        assert_eq!(SessionStore::sanitize_key("..hidden"), "hidden");
        // Reserved device names get a prefix
        assert_eq!(SessionStore::sanitize_key("CON"), "session_CON");
        assert_eq!(SessionStore::sanitize_key(""), "session_");
        // Control characters are dropped
        assert_eq!(SessionStore::sanitize_key("a\nb\tc"), "abc");
    }

    #[tokio::test]
    async fn test_cursor_clamped_on_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        // Envelope claims a cursor beyond the stored messages
        let content = concat!(
            r#"{"_type":"metadata","key":"cli:x","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z","metadata":{},"last_consolidated":99}"#,
            "\n",
            r#"{"role":"user","content":"hi"}"#,
            "\n",
        );
        std::fs::write(dir.path().join("cli_x.jsonl"), content).unwrap();

        let session = store.get_or_create("cli:x").await.unwrap();
        assert_eq!(session.last_consolidated, session.messages.len());
    }
}
