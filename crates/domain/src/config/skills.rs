use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Product-level home directory skills dir (`home/.<product>/skills`).
    #[serde(default = "d_home_path")]
    pub home_path: PathBuf,
    /// Caller-supplied extra directories, searched after the built-in
    /// priority order (workspace/.agent, workspace/.skills, home).
    #[serde(default)]
    pub extra_dirs: Vec<PathBuf>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            home_path: d_home_path(),
            extra_dirs: Vec::new(),
        }
    }
}

fn d_home_path() -> PathBuf {
    dirs_home().join(".serialagent/skills")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
