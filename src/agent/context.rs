//! Context builder for agent conversations
//!
//! Assembles the ordered message list fed to the LLM: a system prompt
//! built from identity, workspace bootstrap files, long-term memory and
//! the skills catalog; then the session history verbatim; then the
//! current user turn with inlined images and a runtime-context block.

use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Local;
use tracing::debug;

use crate::memory::MemoryStore;
use crate::session::{ChatMessage, ContentPart, ImageUrl, MessageContent, ToolCallRecord};
use crate::skills::SkillsLoader;

/// Workspace files spliced into the system prompt when present, in order.
const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

/// Separator between system prompt sections.
const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Builder for constructing conversation context for LLM calls.
pub struct ContextBuilder {
    agent_name: String,
    workspace: PathBuf,
    memory: MemoryStore,
    skills: SkillsLoader,
}

impl ContextBuilder {
    /// Create a context builder rooted at a workspace directory.
    pub fn new(workspace: &Path) -> Self {
        Self {
            agent_name: "AttoClaw".to_string(),
            workspace: workspace.to_path_buf(),
            memory: MemoryStore::new(workspace),
            skills: SkillsLoader::new(workspace),
        }
    }

    /// Override the agent name used in the identity block (builder pattern).
    pub fn with_agent_name(mut self, name: &str) -> Self {
        self.agent_name = name.to_string();
        self
    }

    /// Build the full system prompt.
    ///
    /// Sections are joined by `"\n\n---\n\n"`, each included only when
    /// non-empty: identity, bootstrap files, memory, active skills, and
    /// the skills catalog.
    pub async fn build_system_prompt(&self) -> String {
        let mut sections = vec![self.identity_section()];

        let bootstrap = self.bootstrap_section().await;
        if !bootstrap.is_empty() {
            sections.push(bootstrap);
        }

        let memory = self.memory.get_memory_context().await;
        if !memory.is_empty() {
            sections.push(format!("# Memory\n\n{}", memory));
        }

        let active = self.skills.build_active_skills();
        if !active.is_empty() {
            sections.push(format!("# Active Skills\n\n{}", active));
        }

        let catalog = self.skills.build_skills_summary();
        if !catalog.is_empty() {
            sections.push(format!(
                "{}\n\nTo use a skill, read its full SKILL.md at the listed location with \
                 the read_file tool before relying on it. Skills marked unavailable list \
                 the requirements that are missing.",
                catalog
            ));
        }

        sections.join(SECTION_SEPARATOR)
    }

    /// Build the ordered message list for an LLM call: system prompt,
    /// history verbatim, then the current user turn with runtime context.
    pub async fn build_messages(
        &self,
        history: &[ChatMessage],
        current_message: &str,
        media: &[PathBuf],
        channel: &str,
        chat_id: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&self.build_system_prompt().await)];
        messages.extend_from_slice(history);

        let content = self.build_user_content(current_message, media).await;
        let content = append_runtime_context(content, channel, chat_id);
        let mut user = ChatMessage::user("");
        user.content = Some(content);
        messages.push(user);

        messages
    }

    /// Build the current turn's user content.
    ///
    /// Without media this is the plain text string. With media, image
    /// files are inlined as base64 `data:` URL parts ahead of a single
    /// text part; non-image or unreadable files are silently skipped, and
    /// if every attachment drops the content falls back to plain text.
    pub async fn build_user_content(&self, text: &str, media: &[PathBuf]) -> MessageContent {
        if media.is_empty() {
            return MessageContent::Text(text.to_string());
        }

        let mut parts = Vec::new();
        for path in media {
            let Some(mime) = image_mime(path) else {
                debug!(path = %path.display(), "Skipping non-image attachment");
                continue;
            };
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", mime, encoded),
                        },
                    });
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable attachment");
                }
            }
        }

        if parts.is_empty() {
            return MessageContent::Text(text.to_string());
        }

        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
        MessageContent::Parts(parts)
    }

    fn identity_section(&self) -> String {
        format!(
            "You are {name}, a personal AI assistant.\n\
             Runtime: {os}/{arch}, attoclaw {version}\n\
             Workspace: {workspace}\n\
             Long-term memory: memory/MEMORY.md; history log: memory/HISTORY.md\n\n\
             Tool usage:\n\
             - Read a file before writing or editing it.\n\
             - Verify that a path exists before accessing it.\n\
             - Re-read a file after editing it when accuracy matters.\n\
             - Never predict tool results; wait for them.\n\
             - When a tool fails, diagnose the error before retrying.",
            name = self.agent_name,
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            version = env!("CARGO_PKG_VERSION"),
            workspace = self.workspace.display(),
        )
    }

    async fn bootstrap_section(&self) -> String {
        let mut blocks = Vec::new();
        for file in BOOTSTRAP_FILES {
            let path = self.workspace.join(file);
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                blocks.push(format!("## {}\n\n{}", file, content.trim_end()));
            }
        }
        blocks.join("\n\n")
    }
}

/// Append an assistant message to the in-flight list.
///
/// `content` is always included (null when absent) because some providers
/// reject omission of the key; `tool_calls` only when non-empty;
/// `reasoning_content` is forwarded verbatim when the provider supplied one.
pub fn add_assistant_message(
    messages: &mut Vec<ChatMessage>,
    content: Option<&str>,
    tool_calls: Vec<ToolCallRecord>,
    reasoning_content: Option<&str>,
) {
    messages.push(ChatMessage::assistant_with_tools(
        content,
        tool_calls,
        reasoning_content,
    ));
}

/// Append a tool result to the in-flight list.
pub fn add_tool_result(messages: &mut Vec<ChatMessage>, tool_call_id: &str, name: &str, result: &str) {
    messages.push(ChatMessage::tool_result(tool_call_id, name, result));
}

/// Append the runtime-context block to the user content: a trailing blank
/// line plus block for plain text, a trailing text part for mixed parts.
fn append_runtime_context(content: MessageContent, channel: &str, chat_id: &str) -> MessageContent {
    let block = runtime_context_block(channel, chat_id);
    match content {
        MessageContent::Text(text) => MessageContent::Text(format!("{}\n\n{}", text, block)),
        MessageContent::Parts(mut parts) => {
            parts.push(ContentPart::Text { text: block });
            MessageContent::Parts(parts)
        }
    }
}

fn runtime_context_block(channel: &str, chat_id: &str) -> String {
    let now = Local::now();
    format!(
        "[Runtime Context]\nCurrent Time: {} ({}) ({})\nChannel: {}\nChat ID: {}",
        now.format("%Y-%m-%d %H:%M"),
        now.format("%A"),
        now.format("%Z"),
        channel,
        chat_id
    )
}

fn image_mime(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        Some("bmp") => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_system_prompt_identity_always_present() {
        let dir = TempDir::new().unwrap();
        let builder = ContextBuilder::new(dir.path());

        let prompt = builder.build_system_prompt().await;
        assert!(prompt.contains("You are AttoClaw"));
        assert!(prompt.contains("memory/MEMORY.md"));
        assert!(prompt.contains("Tool usage:"));
        // No bootstrap files, memory, or skills: single section, no separator
        assert!(!prompt.contains(SECTION_SEPARATOR));
    }

    #[tokio::test]
    async fn test_system_prompt_includes_bootstrap_files_in_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "Be kind.").unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "Agents here.").unwrap();
        std::fs::write(dir.path().join("NOTES.md"), "Not a bootstrap file.").unwrap();

        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build_system_prompt().await;

        assert!(prompt.contains("## AGENTS.md\n\nAgents here."));
        assert!(prompt.contains("## SOUL.md\n\nBe kind."));
        assert!(!prompt.contains("NOTES.md"));

        // AGENTS.md comes before SOUL.md regardless of creation order
        let agents_pos = prompt.find("## AGENTS.md").unwrap();
        let soul_pos = prompt.find("## SOUL.md").unwrap();
        assert!(agents_pos < soul_pos);
    }

    #[tokio::test]
    async fn test_system_prompt_includes_memory_section() {
        let dir = TempDir::new().unwrap();
        let memory = MemoryStore::new(dir.path());
        memory.write_long_term("- User is Alice").await.unwrap();

        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build_system_prompt().await;

        assert!(prompt.contains("# Memory"));
        assert!(prompt.contains("## Long-term Memory"));
        assert!(prompt.contains("User is Alice"));
    }

    #[tokio::test]
    async fn test_system_prompt_includes_skills_catalog() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("skills").join("notes");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: notes\ndescription: Note taking\n---\nBody.",
        )
        .unwrap();

        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build_system_prompt().await;

        assert!(prompt.contains("<skills>"));
        assert!(prompt.contains("<name>notes</name>"));
        assert!(prompt.contains("read_file"));
        // Not an always skill: body only reachable via the catalog
        assert!(!prompt.contains("# Active Skills"));
    }

    #[tokio::test]
    async fn test_system_prompt_splices_always_skills() {
        let dir = TempDir::new().unwrap();
        let skill_dir = dir.path().join("skills").join("pinned");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: pinned\ndescription: Pinned skill\nalways: true\n---\nPinned instructions.",
        )
        .unwrap();

        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build_system_prompt().await;

        assert!(prompt.contains("# Active Skills"));
        assert!(prompt.contains("Pinned instructions."));
    }

    #[tokio::test]
    async fn test_build_messages_shape() {
        let dir = TempDir::new().unwrap();
        let builder = ContextBuilder::new(dir.path());

        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant(Some("earlier answer")),
        ];
        let messages = builder
            .build_messages(&history, "new question", &[], "cli", "direct")
            .await;

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content_text(), "earlier question");
        assert_eq!(messages[2].content_text(), "earlier answer");
        assert_eq!(messages[3].role, Role::User);

        let last = messages[3].content_text();
        assert!(last.starts_with("new question"));
        assert!(last.contains("[Runtime Context]"));
        assert!(last.contains("Channel: cli"));
        assert!(last.contains("Chat ID: direct"));
    }

    #[tokio::test]
    async fn test_user_content_with_image() {
        let dir = TempDir::new().unwrap();
        let image_path = dir.path().join("photo.png");
        std::fs::write(&image_path, b"\x89PNG\r\n\x1a\nfakedata").unwrap();

        let builder = ContextBuilder::new(dir.path());
        let content = builder
            .build_user_content("what is this?", &[image_path])
            .await;

        match content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                match &parts[0] {
                    ContentPart::ImageUrl { image_url } => {
                        assert!(image_url.url.starts_with("data:image/png;base64,"));
                    }
                    other => panic!("expected image part, got {:?}", other),
                }
                match &parts[1] {
                    ContentPart::Text { text } => assert_eq!(text, "what is this?"),
                    other => panic!("expected text part, got {:?}", other),
                }
            }
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_user_content_drops_bad_media_to_plain_text() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.png");
        let not_image = dir.path().join("notes.txt");
        std::fs::write(&not_image, "text").unwrap();

        let builder = ContextBuilder::new(dir.path());
        let content = builder
            .build_user_content("hello", &[missing, not_image])
            .await;

        assert_eq!(content, MessageContent::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn test_runtime_context_appended_as_part_for_media() {
        let dir = TempDir::new().unwrap();
        let image_path = dir.path().join("photo.jpg");
        std::fs::write(&image_path, b"fake").unwrap();

        let builder = ContextBuilder::new(dir.path());
        let messages = builder
            .build_messages(&[], "look", &[image_path], "telegram", "42")
            .await;

        match messages.last().unwrap().content.as_ref().unwrap() {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3); // image, text, runtime context
                match parts.last().unwrap() {
                    ContentPart::Text { text } => {
                        assert!(text.starts_with("[Runtime Context]"));
                        assert!(text.contains("Chat ID: 42"));
                    }
                    other => panic!("expected trailing text part, got {:?}", other),
                }
            }
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[test]
    fn test_add_assistant_message_rules() {
        let mut messages = Vec::new();

        add_assistant_message(&mut messages, None, vec![], None);
        assert_eq!(messages.len(), 1);
        // Content key present (null), tool_calls omitted
        let json = serde_json::to_value(&messages[0]).unwrap();
        assert!(json.as_object().unwrap().contains_key("content"));
        assert!(!json.as_object().unwrap().contains_key("tool_calls"));

        add_assistant_message(
            &mut messages,
            Some("Working on it"),
            vec![ToolCallRecord::new("c1", "search", "{}")],
            Some("opaque"),
        );
        assert!(messages[1].has_tool_calls());
        assert_eq!(messages[1].reasoning_content.as_deref(), Some("opaque"));
    }

    #[test]
    fn test_add_tool_result() {
        let mut messages = Vec::new();
        add_tool_result(&mut messages, "c1", "search", "42 results");

        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_tool_result());
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(messages[0].name.as_deref(), Some("search"));
        assert_eq!(messages[0].content_text(), "42 results");
    }

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(image_mime(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(image_mime(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(image_mime(Path::new("a.pdf")), None);
        assert_eq!(image_mime(Path::new("noext")), None);
    }
}
