//! Deadline-bounded execution of external command-line tools.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {}: {diagnostic}", exit_label(.code))]
    Exited {
        tool: String,
        code: Option<i32>,
        diagnostic: String,
    },
    #[error("{tool} did not finish within {}s and was killed", .timeout.as_secs_f64())]
    TimedOut { tool: String, timeout: Duration },
}

impl ToolError {
    /// Human-readable output captured from the tool, when it ran at all
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Exited { diagnostic, .. } => diagnostic.clone(),
            other => other.to_string(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Captured output of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` to completion, killing it if it outlives `timeout`.
///
/// Exit codes other than zero become [`ToolError::Exited`] carrying stderr, or
/// stdout when the tool wrote nothing to stderr.
pub async fn run_tool(tool: &str, mut command: Command, timeout: Duration) -> Result<ToolOutput, ToolError> {
    debug!(tool, "Executing command: {:?}", command.as_std());

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })?;

    // Dropping the wait future on expiry drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(ToolError::TimedOut {
                tool: tool.to_string(),
                timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let diagnostic = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
        return Err(ToolError::Exited {
            tool: tool.to_string(),
            code: output.status.code(),
            diagnostic: diagnostic.to_string(),
        });
    }

    debug!(tool, "Command finished successfully");
    Ok(ToolOutput { stdout, stderr })
}
