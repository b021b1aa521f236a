//! Shell subprocess execution under a wall-clock timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

#[derive(Debug)]
pub enum CommandResult {
    /// The child ran to completion (any exit code).
    Completed {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// Killed after exceeding the wall-clock timeout.
    TimedOut,
    /// The child never ran (empty command line, spawn failure).
    SpawnFailed(String),
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

/// Run `command` through the platform shell, capturing output.
///
/// `kill_on_drop` reaps the child when the timeout fires: dropping the
/// half-finished wait future is what kills it.
pub async fn run_command(command: &str, timeout: Duration) -> CommandResult {
    if command.trim().is_empty() {
        return CommandResult::SpawnFailed("empty command".to_string());
    }

    let mut cmd = shell(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandResult::SpawnFailed(e.to_string()),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandResult::Completed {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        Ok(Err(e)) => CommandResult::SpawnFailed(e.to_string()),
        Err(_) => CommandResult::TimedOut,
    }
}
