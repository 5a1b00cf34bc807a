//! Skills type definitions.

use serde::{Deserialize, Serialize};

/// Loaded skill model.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Skill name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Absolute path to `SKILL.md`.
    pub path: String,
    /// Parsed frontmatter metadata.
    pub metadata: SkillMetadata,
    /// Markdown body content.
    pub content: String,
}

/// Skill listing entry.
#[derive(Debug, Clone)]
pub struct SkillInfo {
    /// Skill name.
    pub name: String,
    /// Skill file path.
    pub path: String,
}

/// Parsed frontmatter metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillMetadata {
    /// Skill name.
    pub name: String,
    /// Skill description.
    pub description: String,
    /// Whether to always splice this skill into the system prompt.
    pub always: bool,
    /// Runtime requirements gating availability.
    pub requires: SkillRequirements,
}

/// Requirement model for a skill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillRequirements {
    /// Required binaries in `PATH` (all must be present).
    pub bins: Vec<String>,
    /// Required environment variables.
    pub env: Vec<String>,
}

impl SkillRequirements {
    /// Whether this skill declares no requirements at all.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty() && self.env.is_empty()
    }
}
