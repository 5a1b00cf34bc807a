//! Skills loader and parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{Skill, SkillInfo, SkillMetadata};

static FRONTMATTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^---\n(.*?)\n---\n?").expect("frontmatter regex"));

/// Discover and load Markdown skills from the workspace skills directory.
pub struct SkillsLoader {
    skills_dir: PathBuf,
}

impl SkillsLoader {
    /// Create a loader for `<workspace>/skills/`.
    pub fn new(workspace: &Path) -> Self {
        Self {
            skills_dir: workspace.join("skills"),
        }
    }

    /// The skills directory.
    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    /// List known skills, sorted by name.
    pub fn list_skills(&self) -> Vec<SkillInfo> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        let entries = match std::fs::read_dir(&self.skills_dir) {
            Ok(entries) => entries,
            Err(_) => return out,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if !seen.insert(name.clone()) {
                continue;
            }

            let skill_file = path.join("SKILL.md");
            if !skill_file.is_file() {
                continue;
            }

            out.push(SkillInfo {
                name,
                path: skill_file.to_string_lossy().to_string(),
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Load one skill by name.
    pub fn load_skill(&self, name: &str) -> Option<Skill> {
        let path = self.skills_dir.join(name).join("SKILL.md");
        if !path.is_file() {
            return None;
        }
        self.parse_skill_file(&path, name)
    }

    /// Full bodies of the always-on skills whose requirements are met,
    /// joined for splicing into the system prompt. Empty when none apply.
    pub fn build_active_skills(&self) -> String {
        let mut parts = Vec::new();
        for info in self.list_skills() {
            if let Some(skill) = self.load_skill(&info.name) {
                if skill.metadata.always && self.missing_requirements(&skill).is_empty() {
                    parts.push(skill.content);
                }
            }
        }
        parts.join("\n\n---\n\n")
    }

    /// Build the XML catalog summarizing every skill for the prompt.
    ///
    /// Unavailable skills list their missing requirements so the agent can
    /// tell the user what to install or configure.
    pub fn build_skills_summary(&self) -> String {
        let skills = self.list_skills();
        if skills.is_empty() {
            return String::new();
        }

        let mut lines = vec!["<skills>".to_string()];
        for info in skills {
            if let Some(skill) = self.load_skill(&info.name) {
                let missing = self.missing_requirements(&skill);
                let available = missing.is_empty();
                lines.push(format!("  <skill available=\"{}\">", available));
                lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
                lines.push(format!(
                    "    <description>{}</description>",
                    escape_xml(&skill.description)
                ));
                lines.push(format!("    <location>{}</location>", escape_xml(&skill.path)));
                if !available {
                    lines.push(format!(
                        "    <requires>{}</requires>",
                        escape_xml(&missing.join(", "))
                    ));
                }
                lines.push("  </skill>".to_string());
            }
        }
        lines.push("</skills>".to_string());
        lines.join("\n")
    }

    /// Unmet requirements of a skill: absent binaries and unset environment
    /// variables. Empty means the skill is available.
    pub fn missing_requirements(&self, skill: &Skill) -> Vec<String> {
        let mut missing = Vec::new();

        for bin in &skill.metadata.requires.bins {
            if !binary_in_path(bin) {
                missing.push(format!("binary '{}'", bin));
            }
        }
        for env_name in &skill.metadata.requires.env {
            if std::env::var(env_name).is_err() {
                missing.push(format!("env '{}'", env_name));
            }
        }

        missing
    }

    fn parse_skill_file(&self, path: &Path, fallback_name: &str) -> Option<Skill> {
        let raw = std::fs::read_to_string(path).ok()?;
        let (metadata, body) = parse_frontmatter(&raw);

        let name = if metadata.name.trim().is_empty() {
            fallback_name.to_string()
        } else {
            metadata.name.clone()
        };
        let description = if metadata.description.trim().is_empty() {
            format!("Skill '{}'", name)
        } else {
            metadata.description.clone()
        };

        Some(Skill {
            name,
            description,
            path: path.to_string_lossy().to_string(),
            metadata,
            content: body,
        })
    }
}

fn parse_frontmatter(content: &str) -> (SkillMetadata, String) {
    if let Some(captures) = FRONTMATTER_RE.captures(content) {
        if let (Some(frontmatter), Some(full)) = (captures.get(1), captures.get(0)) {
            let metadata = match serde_yaml::from_str::<SkillMetadata>(frontmatter.as_str()) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("Failed to parse skill frontmatter: {}", e);
                    SkillMetadata::default()
                }
            };
            let body = content[full.end()..].trim().to_string();
            return (metadata, body);
        }
    }

    (SkillMetadata::default(), content.to_string())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn binary_in_path(bin: &str) -> bool {
    if bin.trim().is_empty() {
        return false;
    }
    let path = match std::env::var_os("PATH") {
        Some(path) => path,
        None => return false,
    };

    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(bin);
        if candidate.is_file() {
            return true;
        }
        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{}.exe", bin));
            if candidate.is_file() {
                return true;
            }
        }
    }

    false
}
