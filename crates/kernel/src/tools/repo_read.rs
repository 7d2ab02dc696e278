//! `repo.read` — read a file within the workspace jail (spec §4.4).

use sa_domain::error::{Error, Result};
use sa_domain::tool::RiskCategory;
use serde::{Deserialize, Serialize};

use crate::anchors::line_anchor;
use crate::registry::{ToolContext, ToolHandler};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    path: String,
    #[serde(default)]
    start_line: Option<usize>,
    #[serde(default)]
    end_line: Option<usize>,
    #[serde(default)]
    include_anchors: bool,
}

#[derive(Debug, Serialize)]
struct Anchor {
    line: usize,
    hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadResult {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchors: Option<Vec<Anchor>>,
}

pub struct RepoReadTool;

#[async_trait::async_trait]
impl ToolHandler for RepoReadTool {
    fn id(&self) -> &str {
        "repo.read"
    }

    fn description(&self) -> &str {
        "Read a file within the workspace, optionally a 1-indexed inclusive line range."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {"type": "string"},
                "startLine": {"type": "integer"},
                "endLine": {"type": "integer"},
                "includeAnchors": {"type": "boolean"}
            }
        })
    }

    fn category(&self) -> RiskCategory {
        RiskCategory::Read
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(input)?;
        let abs = ctx.resolve_path(&args.path)?;

        let bytes = tokio::fs::read(&abs)
            .await
            .map_err(|_| Error::FileNotFound(args.path.clone()))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let lines: Vec<&str> = text.lines().collect();
        let (start, end) = match (args.start_line, args.end_line) {
            (Some(s), Some(e)) => (s, e),
            (Some(s), None) => (s, lines.len().max(1)),
            (None, Some(e)) => (1, e),
            (None, None) => (1, lines.len().max(1)),
        };
        if start == 0 || end < start || start > lines.len() {
            return Err(Error::InvalidRange(format!("{start}..{end}")));
        }
        let end = end.min(lines.len());
        let selected = &lines[(start - 1)..end];
        let content = selected.join("\n");

        let anchors = if args.include_anchors {
            Some(
                selected
                    .iter()
                    .enumerate()
                    .map(|(i, line)| Anchor {
                        line: start + i,
                        hash: line_anchor(line),
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(serde_json::to_value(ReadResult { content, anchors })?)
    }
}
