//! `repo.edit` — anchored line-based edits (spec §4.4).

use sa_domain::error::Result;
use sa_domain::tool::RiskCategory;
use serde::{Deserialize, Serialize};

use crate::anchors::{file_hash, line_anchor};
use crate::registry::{ToolContext, ToolHandler};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    path: String,
    #[serde(default)]
    base_hash: Option<String>,
    #[serde(default)]
    mode: EditMode,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum EditMode {
    Atomic,
    BestEffort,
}

impl Default for EditMode {
    fn default() -> Self {
        EditMode::Atomic
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Operation {
    ReplaceLine {
        line: usize,
        #[serde(rename = "expectedHash")]
        expected_hash: String,
        content: String,
    },
    InsertAfter {
        line: usize,
        #[serde(rename = "expectedHash")]
        expected_hash: String,
        content: String,
    },
    ReplaceRange {
        #[serde(rename = "startLine")]
        start_line: usize,
        #[serde(rename = "endLine")]
        end_line: usize,
        #[serde(rename = "startHash")]
        start_hash: String,
        #[serde(rename = "endHash")]
        end_hash: String,
        content: String,
    },
}

#[derive(Debug, Serialize, Clone)]
struct AnchorWindowLine {
    line: usize,
    hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedOp {
    index: usize,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor_window: Option<Vec<AnchorWindowLine>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditResult {
    path: String,
    file_hash: String,
    applied_operations: usize,
    failed_operations: Vec<FailedOp>,
}

pub struct RepoEditTool;

#[async_trait::async_trait]
impl ToolHandler for RepoEditTool {
    fn id(&self) -> &str {
        "repo.edit"
    }

    fn description(&self) -> &str {
        "Apply anchored line edits to a file, validated against content hashes."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path", "operations"],
            "properties": {
                "path": {"type": "string"},
                "baseHash": {"type": "string"},
                "mode": {"type": "string"},
                "operations": {"type": "array"}
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

        let original = tokio::fs::read_to_string(&abs)
            .await
            .map_err(|_| sa_domain::error::Error::FileNotFound(args.path.clone()))?;

        if let Some(expected) = &args.base_hash {
            if file_hash(original.as_bytes()) != *expected {
                return Ok(serde_json::to_value(EditResult {
                    path: args.path,
                    file_hash: file_hash(original.as_bytes()),
                    applied_operations: 0,
                    failed_operations: vec![FailedOp {
                        index: 0,
                        code: "stale-base",
                        anchor_window: None,
                    }],
                })?);
            }
        }

        let trailing_newline = original.ends_with('\n');
        let mut lines: Vec<String> = original.lines().map(|l| l.to_string()).collect();

        let mut applied = 0usize;
        let mut failures = Vec::new();

        for (index, op) in args.operations.iter().enumerate() {
            match apply_operation(&mut lines, op) {
                Ok(()) => applied += 1,
                Err(failure) => failures.push(FailedOp {
                    index,
                    ..failure
                }),
            }
        }

        let is_atomic = matches!(args.mode, EditMode::Atomic);
        let should_persist = !is_atomic || failures.is_empty();

        let final_text = if should_persist {
            let mut joined = lines.join("\n");
            if trailing_newline {
                joined.push('\n');
            }
            joined
        } else {
            original.clone()
        };

        if should_persist {
            tokio::fs::write(&abs, &final_text).await?;
        }

        let reported_applied = if is_atomic && !failures.is_empty() {
            0
        } else {
            applied
        };

        Ok(serde_json::to_value(EditResult {
            path: args.path,
            file_hash: file_hash(final_text.as_bytes()),
            applied_operations: reported_applied,
            failed_operations: failures,
        })?)
    }
}

fn apply_operation(lines: &mut Vec<String>, op: &Operation) -> std::result::Result<(), FailedOp> {
    match op {
        Operation::ReplaceLine {
            line,
            expected_hash,
            content,
        } => {
            if *line == 0 || *line > lines.len() {
                return Err(invalid_range(0));
            }
            let current = &lines[*line - 1];
            if line_anchor(current) != *expected_hash {
                return Err(anchor_mismatch(lines, *line));
            }
            lines[*line - 1] = content.clone();
            Ok(())
        }
        Operation::InsertAfter {
            line,
            expected_hash,
            content,
        } => {
            if *line == 0 || *line > lines.len() {
                return Err(invalid_range(0));
            }
            let current = &lines[*line - 1];
            if line_anchor(current) != *expected_hash {
                return Err(anchor_mismatch(lines, *line));
            }
            let new_lines: Vec<String> = content.split('\n').map(|s| s.to_string()).collect();
            let insert_at = *line;
            for (offset, new_line) in new_lines.into_iter().enumerate() {
                lines.insert(insert_at + offset, new_line);
            }
            Ok(())
        }
        Operation::ReplaceRange {
            start_line,
            end_line,
            start_hash,
            end_hash,
            content,
        } => {
            if *start_line == 0 || *end_line < *start_line || *end_line > lines.len() {
                return Err(invalid_range(0));
            }
            if line_anchor(&lines[*start_line - 1]) != *start_hash {
                return Err(anchor_mismatch(lines, *start_line));
            }
            if line_anchor(&lines[*end_line - 1]) != *end_hash {
                return Err(anchor_mismatch(lines, *end_line));
            }
            let new_lines: Vec<String> = content.split('\n').map(|s| s.to_string()).collect();
            lines.splice((*start_line - 1)..*end_line, new_lines);
            Ok(())
        }
    }
}

fn invalid_range(index: usize) -> FailedOp {
    FailedOp {
        index,
        code: "invalid-range",
        anchor_window: None,
    }
}

fn anchor_mismatch(lines: &[String], center: usize) -> FailedOp {
    let window_start = center.saturating_sub(1).max(1);
    let window_end = (center + 1).min(lines.len());
    let window = (window_start..=window_end)
        .filter(|&l| l >= 1 && l <= lines.len())
        .map(|l| AnchorWindowLine {
            line: l,
            hash: line_anchor(&lines[l - 1]),
        })
        .collect();
    FailedOp {
        index: 0,
        code: "anchor-mismatch",
        anchor_window: Some(window),
    }
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

    async fn write_sample(dir: &std::path::Path) {
        tokio::fs::write(
            dir.join("a.ts"),
            "const x = 1;\nconst y = 2;\nconst z = 3;\n",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn replace_line_atomic_success() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path()).await;
        let tool = RepoEditTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({
                    "path": "a.ts",
                    "operations": [{"type": "replace-line", "line": 1, "expectedHash": "749b17", "content": "const x = 10;"}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["appliedOperations"], 1);
        assert_eq!(out["failedOperations"].as_array().unwrap().len(), 0);
        let content = tokio::fs::read_to_string(dir.path().join("a.ts")).await.unwrap();
        assert!(content.starts_with("const x = 10;\n"));
    }

    #[tokio::test]
    async fn replace_line_wrong_hash_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path()).await;
        let tool = RepoEditTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({
                    "path": "a.ts",
                    "operations": [{"type": "replace-line", "line": 1, "expectedHash": "000000", "content": "nope"}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["appliedOperations"], 0);
        assert_eq!(out["failedOperations"][0]["code"], "anchor-mismatch");
        let content = tokio::fs::read_to_string(dir.path().join("a.ts")).await.unwrap();
        assert_eq!(content, "const x = 1;\nconst y = 2;\nconst z = 3;\n");
    }

    #[tokio::test]
    async fn stale_base_hash_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path()).await;
        let tool = RepoEditTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({
                    "path": "a.ts",
                    "baseHash": "deadbeef",
                    "operations": [{"type": "replace-line", "line": 1, "expectedHash": "749b17", "content": "x"}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["failedOperations"][0]["code"], "stale-base");
    }

    #[tokio::test]
    async fn best_effort_persists_partial_success() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path()).await;
        let tool = RepoEditTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({
                    "path": "a.ts",
                    "mode": "best-effort",
                    "operations": [
                        {"type": "replace-line", "line": 1, "expectedHash": "749b17", "content": "const x = 10;"},
                        {"type": "replace-line", "line": 2, "expectedHash": "000000", "content": "nope"}
                    ]
                }),
            )
            .await
            .unwrap();
        assert_eq!(out["appliedOperations"], 1);
        assert_eq!(out["failedOperations"].as_array().unwrap().len(), 1);
        let content = tokio::fs::read_to_string(dir.path().join("a.ts")).await.unwrap();
        assert!(content.starts_with("const x = 10;\nconst y = 2;\n"));
    }
}
