//! `repo.patch` — write/overwrite a file (spec §4.4).

use sa_domain::error::Result;
use sa_domain::tool::RiskCategory;
use serde::{Deserialize, Serialize};

use crate::registry::{ToolContext, ToolHandler};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    path: String,
    content: String,
    #[serde(default = "default_true")]
    create_if_missing: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchResult {
    lines_changed: usize,
    created: bool,
}

pub struct RepoPatchTool;

#[async_trait::async_trait]
impl ToolHandler for RepoPatchTool {
    fn id(&self) -> &str {
        "repo.patch"
    }

    fn description(&self) -> &str {
        "Write or overwrite a file, creating parent directories as needed."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"},
                "createIfMissing": {"type": "boolean"}
            }
        })
    }

    fn category(&self) -> RiskCategory {
        RiskCategory::Write
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(input)?;
        let abs = ctx.resolve_path(&args.path)?;

        let existing = tokio::fs::read_to_string(&abs).await.ok();
        let created = existing.is_none();

        if created && !args.create_if_missing {
            return Err(sa_domain::error::Error::FileNotFound(args.path));
        }

        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&abs, &args.content).await?;

        let lines_changed = lines_changed(existing.as_deref().unwrap_or(""), &args.content);

        Ok(serde_json::to_value(PatchResult {
            lines_changed,
            created,
        })?)
    }
}

/// Sum of the file's length delta and per-index line inequalities (spec
/// §4.4 `repo.patch`).
fn lines_changed(before: &str, after: &str) -> usize {
    let before_lines: Vec<&str> = before.lines().collect();
    let after_lines: Vec<&str> = after.lines().collect();
    let len_delta = before_lines.len().abs_diff(after_lines.len());
    let common = before_lines.len().min(after_lines.len());
    let inequalities = (0..common)
        .filter(|&i| before_lines[i] != after_lines[i])
        .count();
    len_delta + inequalities
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
    async fn creates_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RepoPatchTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({"path": "new/file.ts", "content": "hello"}),
            )
            .await
            .unwrap();
        assert_eq!(out["created"], true);
        assert_eq!(
            tokio::fs::read_to_string(dir.path().join("new/file.ts"))
                .await
                .unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn overwrite_counts_changed_lines() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.ts"), "a\nb\nc").await.unwrap();
        let tool = RepoPatchTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({"path": "a.ts", "content": "a\nx\nc\nd"}),
            )
            .await
            .unwrap();
        assert_eq!(out["created"], false);
        assert_eq!(out["linesChanged"], 2);
    }
}
