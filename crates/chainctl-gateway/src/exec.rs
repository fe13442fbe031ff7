//! Subprocess plumbing for tool invocations.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{GatewayError, Result};

/// Captured output of a finished invocation.
pub(crate) struct ToolOutput {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion, capturing both streams.
///
/// With `confirm_prompts` set, an endless stream of `y` answers is fed to
/// the child's stdin so interactive confirmation prompts never block; the
/// feeder stops once the child exits or closes its input. With a deadline
/// set, the child is killed when the budget elapses.
pub(crate) async fn run_tool(
    mut command: Command,
    describe: &str,
    confirm_prompts: bool,
    deadline: Option<Duration>,
) -> Result<ToolOutput> {
    command
        .stdin(if confirm_prompts { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| GatewayError::ExternalTool {
        message: format!("failed to start {describe}: {e}"),
        stderr: String::new(),
    })?;

    if confirm_prompts {
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move { while stdin.write_all(b"y\n").await.is_ok() {} });
        }
    }

    let waited = match deadline {
        Some(limit) => match timeout(limit, child.wait_with_output()).await {
            Ok(done) => done,
            Err(_) => {
                return Err(GatewayError::Timeout {
                    command: describe.to_string(),
                    seconds: limit.as_secs(),
                })
            }
        },
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|e| GatewayError::ExternalTool {
        message: format!("failed to run {describe}: {e}"),
        stderr: String::new(),
    })?;

    let result = ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(
        command = describe,
        code = result.status.code(),
        "tool invocation finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_tool_captures_streams() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo err 1>&2"]);
        let output = run_tool(command, "sh", false, None).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_tool_feeds_confirmations() {
        let mut command = Command::new("sh");
        command.args(["-c", "read answer && echo \"got:$answer\""]);
        let output = run_tool(command, "sh", true, None).await.unwrap();
        assert_eq!(output.stdout.trim(), "got:y");
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let command = Command::new("/nonexistent/definitely-not-a-tool");
        let err = run_tool(command, "missing tool", false, None).await;
        assert!(matches!(err, Err(GatewayError::ExternalTool { .. })));
    }

    #[tokio::test]
    async fn test_run_tool_deadline() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let err = run_tool(command, "sleep", false, Some(Duration::from_millis(100))).await;
        assert!(matches!(err, Err(GatewayError::Timeout { .. })));
    }
}
