//! SKILL.md parsing: optional `---`-delimited YAML frontmatter followed by
//! a markdown body (spec §4.8, §6 "Skill file format").

use serde::{Deserialize, Serialize};

/// Validates a skill name: `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn is_valid_skill_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut expect_alnum = true;
    for ch in name.chars() {
        if expect_alnum {
            if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() {
                return false;
            }
            expect_alnum = false;
        } else if ch == '-' {
            expect_alnum = true;
        } else if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() {
            return false;
        }
    }
    !expect_alnum || name.len() == 1
}

/// Recognized frontmatter keys (spec §6): `name, description, version, license`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillFrontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

/// Splits `content` into parsed frontmatter (if present and well-formed)
/// and the remaining markdown body. Malformed or absent frontmatter
/// yields `None` and the original content as the body.
pub fn parse_frontmatter(content: &str) -> (Option<SkillFrontmatter>, String) {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return (None, content.to_string());
    }

    let after_open = &trimmed[3..];
    let Some(close_idx) = after_open.find("\n---") else {
        return (None, content.to_string());
    };

    let yaml_str = &after_open[..close_idx];
    let body_start = close_idx + 4;
    let body = after_open[body_start..]
        .trim_start_matches('\n')
        .to_string();

    match serde_yaml::from_str::<SkillFrontmatter>(yaml_str) {
        Ok(fm) => (Some(fm), body),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse SKILL.md frontmatter");
            (None, content.to_string())
        }
    }
}

/// Collects `- ./...` reference lines anywhere in the body (spec §4.8).
pub fn extract_references(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            trimmed
                .strip_prefix("- ./")
                .map(|rest| format!("./{rest}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(is_valid_skill_name("review"));
        assert!(is_valid_skill_name("code-review"));
        assert!(is_valid_skill_name("a"));
        assert!(is_valid_skill_name("a1-b2"));
    }

    #[test]
    fn invalid_names() {
        assert!(!is_valid_skill_name(""));
        assert!(!is_valid_skill_name("Review"));
        assert!(!is_valid_skill_name("code_review"));
        assert!(!is_valid_skill_name("code-"));
        assert!(!is_valid_skill_name("-code"));
    }

    #[test]
    fn parses_frontmatter_and_body() {
        let content = "---\nname: review\ndescription: reviews code\n---\n# Review\nDo it.\n";
        let (fm, body) = parse_frontmatter(content);
        let fm = fm.unwrap();
        assert_eq!(fm.name.as_deref(), Some("review"));
        assert_eq!(fm.description.as_deref(), Some("reviews code"));
        assert_eq!(body, "# Review\nDo it.\n");
    }

    #[test]
    fn no_frontmatter_returns_whole_body() {
        let content = "# Just markdown\n";
        let (fm, body) = parse_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn collects_reference_lines() {
        let body = "See also:\n- ./references/one.md\n- ./scripts/run.sh\nNot a ref: ./skip.md\n";
        let refs = extract_references(body);
        assert_eq!(refs, vec!["./references/one.md", "./scripts/run.sh"]);
    }
}
