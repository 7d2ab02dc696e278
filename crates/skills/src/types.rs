use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A discovered skill (spec §4.8). `source_dir` records which priority
/// directory it was found under — used by `listBySource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Full markdown body (frontmatter stripped).
    pub content: String,
    /// `- ./path` references collected from the body.
    pub references: Vec<String>,
    pub path: PathBuf,
    pub source_dir: PathBuf,
}
