//! Spawns and signals `jobq-worker` processes.
//!
//! The PID file holds newline-separated decimal PIDs; `start` appends,
//! `stop` terminates and removes the file. This is operator plumbing, not
//! queue state: a stale PID file is fixed by running `worker stop` again.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;

pub const PID_FILE: &str = ".workers.pid";

pub fn start(count: usize, db: &Path) -> anyhow::Result<Vec<u32>> {
    let binary = worker_binary();
    let mut pids = Vec::with_capacity(count);

    for _ in 0..count {
        let child = Command::new(&binary)
            .env("QUEUE_DB", db)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {}", binary.display()))?;
        pids.push(child.id());
    }

    let mut recorded = std::fs::read_to_string(PID_FILE).unwrap_or_default();
    for pid in &pids {
        recorded.push_str(&format!("{pid}\n"));
    }
    std::fs::write(PID_FILE, recorded).context("failed to write PID file")?;

    Ok(pids)
}

pub fn stop() -> anyhow::Result<usize> {
    let recorded = match std::fs::read_to_string(PID_FILE) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).context("failed to read PID file"),
    };

    let mut stopped = 0;
    for line in recorded.lines() {
        let Ok(pid) = line.trim().parse::<u32>() else {
            continue;
        };
        if terminate(pid) {
            stopped += 1;
        }
    }

    std::fs::remove_file(PID_FILE).context("failed to remove PID file")?;
    Ok(stopped)
}

/// The worker binary ships next to this one; fall back to PATH lookup.
fn worker_binary() -> PathBuf {
    let name = if cfg!(windows) {
        "jobq-worker.exe"
    } else {
        "jobq-worker"
    };
    std::env::current_exe()
        .ok()
        .and_then(|exe| Some(exe.parent()?.join(name)))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> bool {
    false
}
