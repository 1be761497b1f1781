//! Cancellable subprocess execution, grounded in the monitoring harness's
//! `Command::new(...).output()` idiom but adapted to `tokio::process`
//! so a cancelled context kills the child rather than leaking it.

use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("command {0} not found")]
    NotFound(String),
    #[error("command {0} timed out")]
    TimedOut(String),
    #[error("command {0} cancelled")]
    Cancelled(String),
    #[error("command {0} failed to spawn: {1}")]
    Spawn(String, std::io::Error),
}

/// Runs `program args...` under `ctx`, killing the child if cancelled or if
/// `timeout` elapses first.
pub async fn run(
    program: &str,
    args: &[&str],
    timeout: Duration,
    ctx: &CancellationToken,
) -> Result<CommandOutput, SubprocessError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SubprocessError::NotFound(program.to_string())
            } else {
                SubprocessError::Spawn(program.to_string(), e)
            }
        })?;

    let wait = child.wait_with_output();
    tokio::pin!(wait);

    tokio::select! {
        _ = ctx.cancelled() => Err(SubprocessError::Cancelled(program.to_string())),
        _ = tokio::time::sleep(timeout) => Err(SubprocessError::TimedOut(program.to_string())),
        result = &mut wait => {
            let output = result.map_err(|e| SubprocessError::Spawn(program.to_string(), e))?;
            Ok(CommandOutput {
                status_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}
