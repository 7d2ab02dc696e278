//! Skill discovery and registry (spec §4.8).

pub mod loader;
pub mod manifest;
pub mod registry;
pub mod types;

pub use loader::{scan_skills, skill_search_dirs};
pub use manifest::{is_valid_skill_name, parse_frontmatter, SkillFrontmatter};
pub use registry::SkillsRegistry;
pub use types::SkillEntry;
