//! Discovers `SKILL.md` files across the priority-ordered directory list
//! (spec §4.8): `workspace/.agent/skills/<name>/SKILL.md`,
//! `workspace/.skills/<name>/SKILL.md`, `home/.<product>/skills/<name>/SKILL.md`,
//! plus caller-supplied extra directories. First directory in priority
//! order wins on a name collision.

use std::path::{Path, PathBuf};

use sa_domain::error::Result;

use crate::manifest;
use crate::types::SkillEntry;

/// Builds the ordered list of `<name>/SKILL.md` parent directories to scan,
/// highest priority first.
pub fn skill_search_dirs(
    workspace_root: &Path,
    home_dir: Option<&Path>,
    product: &str,
    extra_dirs: &[PathBuf],
) -> Vec<PathBuf> {
    let mut dirs = vec![
        workspace_root.join(".agent").join("skills"),
        workspace_root.join(".skills"),
    ];
    if let Some(home) = home_dir {
        dirs.push(home.join(format!(".{product}")).join("skills"));
    }
    dirs.extend(extra_dirs.iter().cloned());
    dirs
}

/// Scans every directory in `search_dirs` (in order) for `<name>/SKILL.md`
/// entries. A name already seen in an earlier directory is skipped.
pub fn scan_skills(search_dirs: &[PathBuf]) -> Result<Vec<SkillEntry>> {
    let mut entries = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for dir in search_dirs {
        if !dir.exists() {
            continue;
        }
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to read skills directory");
                continue;
            }
        };

        let mut names: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        names.sort();

        for skill_dir in names {
            let name = match skill_dir.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };
            if seen.contains(&name) {
                continue;
            }
            let md_path = skill_dir.join("SKILL.md");
            if !md_path.exists() {
                continue;
            }
            match load_entry(&name, &md_path, dir) {
                Ok(entry) => {
                    seen.insert(name);
                    entries.push(entry);
                }
                Err(e) => {
                    tracing::warn!(skill = %name, error = %e, "skipping unreadable SKILL.md");
                }
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn load_entry(dir_name: &str, md_path: &Path, source_dir: &Path) -> Result<SkillEntry> {
    let raw = std::fs::read_to_string(md_path)?;
    let (frontmatter, body) = manifest::parse_frontmatter(&raw);
    let fm = frontmatter.unwrap_or_default();

    let name = fm.name.unwrap_or_else(|| dir_name.to_string());
    let references = manifest::extract_references(&body);

    Ok(SkillEntry {
        name,
        description: fm.description.unwrap_or_default(),
        version: fm.version,
        license: fm.license,
        content: body,
        references,
        path: md_path.to_path_buf(),
        source_dir: source_dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), body).unwrap();
    }

    #[test]
    fn first_directory_wins_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let high = tmp.path().join("high");
        let low = tmp.path().join("low");
        std::fs::create_dir_all(&high).unwrap();
        std::fs::create_dir_all(&low).unwrap();

        write_skill(&high, "review", "---\ndescription: from high\n---\nbody");
        write_skill(&low, "review", "---\ndescription: from low\n---\nbody");

        let entries = scan_skills(&[high, low]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "from high");
    }

    #[test]
    fn collects_multiple_skills() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("skills");
        std::fs::create_dir_all(&root).unwrap();
        write_skill(&root, "a", "---\ndescription: A\n---\nbody a");
        write_skill(&root, "b", "---\ndescription: B\n---\nbody b");

        let entries = scan_skills(&[root]).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[1].name, "b");
    }

    #[test]
    fn missing_directory_yields_empty() {
        let entries = scan_skills(&[PathBuf::from("/does/not/exist")]).unwrap();
        assert!(entries.is_empty());
    }
}
