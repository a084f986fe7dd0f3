//! Shell command execution with a hard timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::protocol::ErrorTag;

/// Captured result of one shell execution attempt.
///
/// Execution never fails as an error value: spawn failures and timeouts are
/// folded into the outcome so the loop always has a response to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Captured standard output, lossily decoded as UTF-8.
    pub stdout: String,
    /// Captured standard error, lossily decoded as UTF-8.
    pub stderr: String,
    /// Process exit status, or `-1` when no status was obtained.
    pub returncode: i32,
    /// Failure tag, or `None` on a completed run (any exit status).
    pub error: Option<ErrorTag>,
}

/// Run `command` through `sh -c` in `cwd`, capturing output as text.
///
/// The child is bounded by `timeout`: on expiry the output future is
/// dropped and `kill_on_drop` terminates the process rather than leaving it
/// running, and the outcome carries [`ErrorTag::Timeout`] with an empty
/// stdout and return code `-1`. Spawn or capture failures become
/// [`ErrorTag::Exception`] with the error text as stderr.
pub async fn run_shell(command: &str, cwd: &Path, timeout: Duration) -> ExecOutcome {
    let output_fut = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output_fut).await {
        Ok(Ok(output)) => ExecOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            returncode: output.status.code().unwrap_or(-1),
            error: None,
        },
        Ok(Err(err)) => {
            warn!(%err, "command could not be executed");
            ExecOutcome {
                stdout: String::new(),
                stderr: err.to_string(),
                returncode: -1,
                error: Some(ErrorTag::Exception),
            }
        }
        Err(_elapsed) => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, child killed");
            ExecOutcome {
                stdout: String::new(),
                stderr: format!("Command timed out after {} seconds", timeout.as_secs()),
                returncode: -1,
                error: Some(ErrorTag::Timeout),
            }
        }
    }
}
