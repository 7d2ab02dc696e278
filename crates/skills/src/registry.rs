//! In-memory skills registry (spec §4.8): `register`, `get`, `getAll`,
//! `filter`, `search`, `listBySource`.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use sa_domain::error::{Error, Result};

use crate::loader;
use crate::types::SkillEntry;

pub struct SkillsRegistry {
    entries: RwLock<Vec<SkillEntry>>,
}

impl SkillsRegistry {
    /// Discovers and loads every `SKILL.md` under `search_dirs`, in
    /// priority order (spec §4.8).
    pub fn load(search_dirs: &[PathBuf]) -> Result<Self> {
        let entries = loader::scan_skills(search_dirs)?;
        tracing::info!(skills_count = entries.len(), "skills registry loaded");
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Registers a skill, overwriting any existing entry with the same name.
    pub fn register(&self, entry: SkillEntry) {
        let mut entries = self.entries.write();
        entries.retain(|e| e.name != entry.name);
        entries.push(entry);
        entries.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn get(&self, name: &str) -> Result<SkillEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| Error::SkillNotFound(name.to_string()))
    }

    pub fn get_all(&self) -> Vec<SkillEntry> {
        self.entries.read().clone()
    }

    /// `names` empty or absent selects every skill.
    pub fn filter(&self, names: Option<&[String]>) -> Vec<SkillEntry> {
        match names {
            None => self.get_all(),
            Some(names) if names.is_empty() => self.get_all(),
            Some(names) => self
                .entries
                .read()
                .iter()
                .filter(|e| names.iter().any(|n| n == &e.name))
                .cloned()
                .collect(),
        }
    }

    /// Case-insensitive substring match on name or description.
    pub fn search(&self, query: &str) -> Vec<SkillEntry> {
        let q = query.to_lowercase();
        self.entries
            .read()
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&q) || e.description.to_lowercase().contains(&q))
            .cloned()
            .collect()
    }

    /// Groups skill names by the priority directory they were discovered in.
    pub fn list_by_source(&self) -> HashMap<PathBuf, Vec<String>> {
        let mut out: HashMap<PathBuf, Vec<String>> = HashMap::new();
        for entry in self.entries.read().iter() {
            out.entry(entry.source_dir.clone())
                .or_default()
                .push(entry.name.clone());
        }
        out
    }

    pub fn reload(&self, search_dirs: &[PathBuf]) -> Result<usize> {
        let new_entries = loader::scan_skills(search_dirs)?;
        let count = new_entries.len();
        *self.entries.write() = new_entries;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, description: &str) -> SkillEntry {
        SkillEntry {
            name: name.into(),
            description: description.into(),
            version: None,
            license: None,
            content: String::new(),
            references: vec![],
            path: PathBuf::from(format!("/skills/{name}/SKILL.md")),
            source_dir: PathBuf::from("/skills"),
        }
    }

    #[test]
    fn filter_empty_returns_all() {
        let reg = SkillsRegistry::empty();
        reg.register(entry("a", "alpha"));
        reg.register(entry("b", "beta"));
        assert_eq!(reg.filter(None).len(), 2);
        assert_eq!(reg.filter(Some(&[])).len(), 2);
    }

    #[test]
    fn filter_selects_named() {
        let reg = SkillsRegistry::empty();
        reg.register(entry("a", "alpha"));
        reg.register(entry("b", "beta"));
        let filtered = reg.filter(Some(&["b".to_string()]));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "b");
    }

    #[test]
    fn search_is_case_insensitive() {
        let reg = SkillsRegistry::empty();
        reg.register(entry("code-review", "Reviews Pull Requests"));
        assert_eq!(reg.search("pull").len(), 1);
        assert_eq!(reg.search("REVIEW").len(), 1);
        assert_eq!(reg.search("nope").len(), 0);
    }

    #[test]
    fn register_overwrites_same_name() {
        let reg = SkillsRegistry::empty();
        reg.register(entry("a", "first"));
        reg.register(entry("a", "second"));
        assert_eq!(reg.get_all().len(), 1);
        assert_eq!(reg.get("a").unwrap().description, "second");
    }

    #[test]
    fn get_missing_is_not_found() {
        let reg = SkillsRegistry::empty();
        assert!(reg.get("missing").is_err());
    }
}
