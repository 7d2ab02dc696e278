//! `process.run` — execute a shell command rooted at the workspace (spec §4.4).

use std::time::Instant;

use sa_domain::error::Result;
use sa_domain::tool::RiskCategory;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::registry::{ToolContext, ToolHandler};

#[derive(Debug, Deserialize)]
struct Args {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
    duration_ms: u128,
}

/// Environment variables that disable interactive pagers in subprocesses
/// (spec §4.4 "Environment must disable interactive pagers").
const PAGER_ENV: &[(&str, &str)] = &[
    ("PAGER", "cat"),
    ("GIT_PAGER", "cat"),
    ("MANPAGER", "cat"),
    ("GH_PAGER", "cat"),
    ("SYSTEMD_PAGER", "cat"),
];

pub struct ProcessRunTool;

#[async_trait::async_trait]
impl ToolHandler for ProcessRunTool {
    fn id(&self) -> &str {
        "process.run"
    }

    fn description(&self) -> &str {
        "Execute a shell command rooted at the workspace."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {"type": "string"},
                "cwd": {"type": "string"}
            }
        })
    }

    fn category(&self) -> RiskCategory {
        RiskCategory::Exec
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args: Args = serde_json::from_value(input)?;

        let cwd = match &args.cwd {
            Some(c) => ctx.resolve_path(c)?,
            None => ctx.workspace_root.clone(),
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(&cwd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null());
        for (k, v) in PAGER_ENV {
            cmd.env(k, v);
        }

        let started = Instant::now();
        let output = cmd.output().await?;
        let duration_ms = started.elapsed().as_millis();

        Ok(serde_json::to_value(RunResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms,
        })?)
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

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ProcessRunTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({"command": "echo hello"}),
            )
            .await
            .unwrap();
        assert_eq!(out["exitCode"], 0);
        assert_eq!(out["stdout"], "hello\n");
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported_not_errored() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ProcessRunTool;
        let out = tool
            .execute(
                &ctx(dir.path().to_path_buf()),
                serde_json::json!({"command": "exit 7"}),
            )
            .await
            .unwrap();
        assert_eq!(out["exitCode"], 7);
    }
}
