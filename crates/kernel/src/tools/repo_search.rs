//! `repo.search` — recursive case-sensitive text search (spec §4.4).

use sa_domain::error::Result;
use sa_domain::tool::RiskCategory;
use serde::{Deserialize, Serialize};

use crate::jail::glob_match;
use crate::registry::{ToolContext, ToolHandler};

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    #[serde(default)]
    globs: Option<Vec<String>>,
    #[serde(default = "default_max_results")]
    #[serde(rename = "maxResults")]
    max_results: usize,
}

fn default_max_results() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct Hit {
    file: String,
    line: usize,
    content: String,
}

pub struct RepoSearchTool;

#[async_trait::async_trait]
impl ToolHandler for RepoSearchTool {
    fn id(&self) -> &str {
        "repo.search"
    }

    fn description(&self) -> &str {
        "Recursive case-sensitive text search across the workspace."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string"},
                "globs": {"type": "array"},
                "maxResults": {"type": "integer"}
            }
        })
    }

    fn category(&self) -> RiskCategory {
        RiskCategory::Read
    }

    fn risk_subject<'a>(&self, args: &'a serde_json::Value) -> Option<&'a str> {
        args.get("query").and_then(|v| v.as_str())
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(input)?;
        let mut hits = Vec::new();
        walk(&ctx.workspace_root, &ctx.workspace_root, &args, &mut hits)?;
        hits.truncate(args.max_results);
        Ok(serde_json::to_value(hits)?)
    }
}

fn walk(
    root: &std::path::Path,
    dir: &std::path::Path,
    args: &Args,
    hits: &mut Vec<Hit>,
) -> Result<()> {
    if hits.len() >= args.max_results {
        return Ok(());
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        if hits.len() >= args.max_results {
            return Ok(());
        }
        let path = entry.path();
        let file_type = entry.file_type();
        if file_type.map(|t| t.is_dir()).unwrap_or(false) {
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            walk(root, &path, args, hits)?;
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        if let Some(globs) = &args.globs {
            if !globs.is_empty() && !globs.iter().any(|g| glob_match(g, &relative)) {
                continue;
            }
        }

        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if line.contains(&args.query) {
                hits.push(Hit {
                    file: relative.clone(),
                    line: idx + 1,
                    content: line.to_string(),
                });
                if hits.len() >= args.max_results {
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx(root: std::path::PathBuf) -> ToolContext {
        ToolContext {
            workspace_root: root,
            run_id: "r1".into(),
            session_id: "s1".into(),
            cancel_token: CancellationToken::new(),
            deny_patterns: vec![],
        }
    }

    #[tokio::test]
    async fn finds_matches_across_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "const needle = 1;\nother\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.ts"), "needle again\n").unwrap();

        let tool = RepoSearchTool;
        let out = tool
            .execute(&ctx(dir.path().to_path_buf()), serde_json::json!({"query": "needle"}))
            .await
            .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn respects_glob_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "needle\n").unwrap();
        std::fs::write(dir.path().join("a.md"), "needle\n").unwrap();

        let tool = RepoSearchTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({"query": "needle", "globs": ["*.ts"]}),
            )
            .await
            .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 1);
        assert_eq!(out[0]["file"], "a.ts");
    }

    #[tokio::test]
    async fn respects_max_results() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "needle\nneedle\nneedle\n").unwrap();

        let tool = RepoSearchTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({"query": "needle", "maxResults": 2}),
            )
            .await
            .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 2);
    }
}
