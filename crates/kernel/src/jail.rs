//! Workspace jail: path resolution that never escapes `workspaceRoot`, and
//! the deny-glob matcher (spec §4.4 `validatePath`).

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use sa_domain::error::{Error, Result};

/// Resolves `target` against `workspace_root`, failing if it escapes the
/// root or matches a deny pattern.
///
/// `target` must be a relative path; an absolute path is rejected as an
/// escape attempt (the jail has no notion of "absolute within the root").
pub fn validate_path(
    workspace_root: &Path,
    target: &str,
    deny_patterns: &[String],
) -> Result<PathBuf> {
    let relative = normalize_relative(Path::new(target))
        .ok_or_else(|| Error::WorkspaceEscape(target.to_string()))?;

    let rel_str = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");

    for pattern in deny_patterns {
        if glob_match(pattern, &rel_str) {
            return Err(Error::DenyPatternMatch(rel_str));
        }
    }

    Ok(workspace_root.join(relative))
}

/// Lexically normalizes a (possibly relative-with-`..`) path with no
/// filesystem access. Returns `None` if it would escape above its own
/// root (a leading `..` or an absolute path).
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut stack: Vec<std::ffi::OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => stack.push(part.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(stack.into_iter().collect())
}

/// Matches `path` (posix-style, `/`-separated) against a glob `pattern`.
///
/// `*` matches any run of non-separator characters; `**` matches any run
/// including separators. A pattern beginning with `**/` also matches when
/// that prefix is absent (the `(?:.*/)?` translation below makes the
/// leading directory segment optional).
pub fn glob_match(pattern: &str, path: &str) -> bool {
    glob_to_regex(pattern).is_match(path)
}

fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            c if r"\.+^$()[]{}|?".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/workspace")
    }

    #[test]
    fn escape_via_parent_dir_is_rejected() {
        let err = validate_path(&root(), "../../etc/passwd", &[]).unwrap_err();
        assert!(matches!(err, Error::WorkspaceEscape(_)));
    }

    #[test]
    fn deny_pattern_rejects_git_dir() {
        let patterns = vec!["**/.git/**".to_string()];
        let err = validate_path(&root(), ".git/config", &patterns).unwrap_err();
        assert!(matches!(err, Error::DenyPatternMatch(_)));
    }

    #[test]
    fn ordinary_path_resolves_under_root() {
        let abs = validate_path(&root(), "src/hello.ts", &[]).unwrap();
        assert_eq!(abs, PathBuf::from("/workspace/src/hello.ts"));
    }

    #[test]
    fn double_star_matches_nested_and_unnested() {
        assert!(glob_match("**/.git/**", "a/b/.git/HEAD"));
        assert!(glob_match("**/.git/**", ".git/HEAD"));
        assert!(!glob_match("**/.git/**", "src/hello.ts"));
    }

    #[test]
    fn single_star_does_not_cross_separators() {
        assert!(glob_match("*.env", ".env"));
        assert!(!glob_match("*.env", "a/.env"));
    }

    #[test]
    fn curdir_components_are_ignored() {
        let abs = validate_path(&root(), "./src/./hello.ts", &[]).unwrap();
        assert_eq!(abs, PathBuf::from("/workspace/src/hello.ts"));
    }
}
