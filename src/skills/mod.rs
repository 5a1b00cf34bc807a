//! Skills system - progressive loading of Markdown skill files
//!
//! Skills live at `<workspace>/skills/<name>/SKILL.md`. Skills flagged
//! `always: true` whose requirements are satisfied are spliced whole into
//! the system prompt; every other skill appears only in a compact XML
//! catalog, and the agent fetches the full body on demand with its own
//! `read_file` tool. This keeps the prompt size flat regardless of how
//! many skills are installed.

mod loader;
mod types;

pub use loader::SkillsLoader;
pub use types::{Skill, SkillInfo, SkillMetadata, SkillRequirements};
