//! Process runner.
//!
//! Spawns one argv with the host's stdout and stderr inherited and waits for
//! it. Stdin is `/dev/null`, so concurrent children never contend for the
//! terminal. The pid is published through [`ProcessHandle`] so that a
//! [`TimeoutArbiter`](crate::TimeoutArbiter) running on another task can
//! signal the child.

use std::fmt;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use oc_core::time::as_millis;

use crate::command::CommandLine;
use crate::error::ExecError;

/// One command execution.
///
/// Owned by the task that runs the child. The arbiter only reads the pid and
/// may request a kill.
#[derive(Debug)]
pub struct ProcessHandle {
    command: CommandLine,
    pid: OnceLock<u32>,
    started_at: Instant,
    kill: Notify,
}

impl ProcessHandle {
    /// Creates a handle for `command`. Nothing is spawned yet.
    #[must_use]
    pub fn new(command: CommandLine) -> Self {
        Self {
            command,
            pid: OnceLock::new(),
            started_at: Instant::now(),
            kill: Notify::new(),
        }
    }

    /// Returns the command being run.
    #[must_use]
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Returns the pid once the child has been spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    /// Returns the time since the handle was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Asks the owning task to kill the child.
    ///
    /// Used where no interruption signal can be delivered by pid.
    pub fn request_kill(&self) {
        self.kill.notify_one();
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.command, f)
    }
}

/// Runs `command` to completion.
///
/// # Errors
///
/// Returns [`ExecError::Parse`] for a malformed or empty command,
/// [`ExecError::Spawn`] if it cannot be started, and
/// [`ExecError::Process`] if it exits unsuccessfully.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), oc_exec::ExecError> {
/// oc_exec::execute("cargo test --quiet").await?;
/// # Ok(())
/// # }
/// ```
pub async fn execute(command: &str) -> Result<(), ExecError> {
    let command = CommandLine::parse(command)?;
    run(&ProcessHandle::new(command)).await
}

/// Spawns the child described by `handle` and waits for it.
pub(crate) async fn run(handle: &ProcessHandle) -> Result<(), ExecError> {
    let command = handle.command();
    let mut child = Command::new(command.program())
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| ExecError::spawn(command.program(), source))?;

    let pid = child.id();
    if let Some(pid) = pid {
        // Set once per handle.
        let _ = handle.pid.set(pid);
    }
    info!(pid, command = %command, "Process started");

    let status = tokio::select! {
        status = child.wait() => status,
        () = handle.kill.notified() => {
            debug!(pid, "Killing process");
            child.start_kill().map_err(|source| ExecError::Wait { pid, source })?;
            child.wait().await
        }
    }
    .map_err(|source| ExecError::Wait { pid, source })?;

    debug!(
        pid,
        status = %status,
        elapsed_ms = as_millis(handle.elapsed()),
        "Process exited"
    );

    if status.success() {
        Ok(())
    } else {
        Err(ExecError::Process {
            pid,
            status,
            interrupted: None,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_success() {
        execute("true").await.expect("true succeeds");
    }

    #[tokio::test]
    async fn test_execute_nonzero_exit_keeps_code() {
        let err = execute("sh -c 'exit 3'").await.expect_err("exit 3");
        assert_eq!(err.code(), Some(3));
        assert!(err.pid().is_some());
        assert_eq!(err.interrupted(), None);
    }

    #[tokio::test]
    async fn test_child_stdin_is_empty() {
        let started = Instant::now();
        execute("sh -c 'read line; test -z \"$line\"'")
            .await
            .expect("read sees EOF");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_execute_missing_program() {
        let err = execute("definitely-not-a-real-program-oc")
            .await
            .expect_err("missing binary");
        assert!(
            matches!(err, ExecError::Spawn { ref program, .. } if program == "definitely-not-a-real-program-oc")
        );
    }

    #[tokio::test]
    async fn test_execute_empty_command() {
        let err = execute("").await.expect_err("empty");
        assert!(matches!(err, ExecError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_pid_recorded_after_spawn() {
        let handle = ProcessHandle::new(CommandLine::parse("true").expect("parses"));
        assert!(handle.pid().is_none());

        run(&handle).await.expect("true succeeds");
        assert!(handle.pid().is_some());
    }

    #[tokio::test]
    async fn test_request_kill_stops_child() {
        let handle = std::sync::Arc::new(ProcessHandle::new(
            CommandLine::parse("sleep 5").expect("parses"),
        ));
        let runner = {
            let handle = std::sync::Arc::clone(&handle);
            tokio::spawn(async move { run(&handle).await })
        };

        while handle.pid().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.request_kill();

        let err = runner.await.expect("task joins").expect_err("killed");
        assert!(matches!(err, ExecError::Process { .. }));
        assert_eq!(err.code(), None);
        assert!(handle.elapsed() < Duration::from_secs(5));
    }
}
