//! Timeout arbitration.
//!
//! # State Machine
//!
//! ```text
//!            ┌────────── completion ──────────────────────────────┐
//!            │                                                    ▼
//! ┌─────────┐  deadline / interrupt  ┌──────────┐  pid seen  ┌────────┐
//! │ Running │ ─────────────────────► │ Stopping │ ─────────► │ Killed │
//! └─────────┘                        └──────────┘            └────────┘
//!                                     │      ▲                  │ wait
//!                          no pid yet │      │ spawn_poll       ▼
//!                                     └──────┘           ┌──────────┐
//!                                                        │ Finished │
//!                                                        └──────────┘
//! ```
//!
//! The arbiter never fabricates a timeout error. The result is always the
//! child's own exit result; the `interrupted` field of
//! [`ExecError::Process`] records that the arbiter sent the interruption.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use oc_core::ExecConfig;
use oc_core::time::{as_millis, timeout_from_millis};

use crate::command::CommandLine;
use crate::error::{ExecError, StopReason};
use crate::runner::{self, ProcessHandle};

/// Races command executions against a deadline and an interrupt token.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use oc_core::ExecConfig;
/// use oc_exec::{ExecError, TimeoutArbiter};
///
/// # async fn example() {
/// let arbiter = TimeoutArbiter::new(&ExecConfig::default())
///     .with_timeout(Some(Duration::from_secs(30)));
///
/// match arbiter.run("make check").await {
///     Ok(()) => println!("passed"),
///     Err(err) if err.interrupted().is_some() => println!("took too long: {err}"),
///     Err(err) => println!("failed: {err}"),
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutArbiter {
    timeout: Option<Duration>,
    spawn_poll_interval: Duration,
    interrupt: Option<CancellationToken>,
}

impl TimeoutArbiter {
    /// Creates an arbiter from the execution configuration.
    #[must_use]
    pub fn new(config: &ExecConfig) -> Self {
        Self {
            timeout: config.timeout(),
            spawn_poll_interval: config.spawn_poll_interval(),
            interrupt: None,
        }
    }

    /// Sets the timeout; `None` disables it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Interrupts running children when `token` is cancelled.
    #[must_use]
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// Sets how often a fired deadline re-checks for an unrecorded pid.
    #[must_use]
    pub fn with_spawn_poll_interval(mut self, interval: Duration) -> Self {
        self.spawn_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `command`, interrupting it if the deadline or the interrupt token
    /// fires first.
    ///
    /// With neither a timeout nor an interrupt token this is a plain
    /// [`execute`](crate::execute).
    pub async fn run(&self, command: &str) -> Result<(), ExecError> {
        let command = CommandLine::parse(command)?;
        let handle = Arc::new(ProcessHandle::new(command));

        if self.timeout.is_none() && self.interrupt.is_none() {
            return runner::run(&handle).await;
        }

        let task = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { runner::run(&handle).await }
        });
        self.arbitrate(&handle, task).await
    }

    /// Races `task`, which runs the child behind `handle`, against the
    /// deadline and the interrupt token.
    async fn arbitrate(
        &self,
        handle: &ProcessHandle,
        mut task: JoinHandle<Result<(), ExecError>>,
    ) -> Result<(), ExecError> {
        let interrupt = self.interrupt.clone().unwrap_or_default();
        let mut wake_at = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut stopping: Option<StopReason> = None;

        let stopped = loop {
            tokio::select! {
                biased;
                joined = &mut task => return finish(joined, handle, None),
                () = interrupt.cancelled(), if stopping.is_none() => {
                    stopping = Some(StopReason::Interrupted);
                }
                () = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    stopping.get_or_insert(StopReason::Timeout);
                }
            }

            let Some(reason) = stopping else {
                continue;
            };
            if let Some(pid) = handle.pid() {
                info!(
                    pid,
                    reason = %reason,
                    elapsed_ms = as_millis(handle.elapsed()),
                    "Interrupting process"
                );
                interrupt_process(handle, pid);
                break reason;
            }

            trace!(reason = %reason, "Process not spawned yet, polling");
            wake_at = Some(Instant::now() + self.spawn_poll_interval);
        };

        let joined = task.await;
        finish(joined, handle, Some(stopped))
    }
}

fn finish(
    joined: Result<Result<(), ExecError>, JoinError>,
    handle: &ProcessHandle,
    stopped: Option<StopReason>,
) -> Result<(), ExecError> {
    let result = joined.map_err(|join| ExecError::Wait {
        pid: handle.pid(),
        source: io::Error::other(join),
    })?;

    match (result, stopped) {
        (Err(err), Some(reason)) => Err(err.with_stop_reason(reason)),
        (result, _) => result,
    }
}

#[cfg(unix)]
fn interrupt_process(_handle: &ProcessHandle, pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "Pid out of range, cannot signal");
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGINT) {
        Ok(()) => {}
        Err(Errno::ESRCH) => debug!(pid, "Process already gone"),
        Err(errno) => {
            let error = ExecError::signal(Some(pid), errno);
            warn!(pid, error = %error, "Failed to interrupt process");
        }
    }
}

#[cfg(not(unix))]
fn interrupt_process(handle: &ProcessHandle, pid: u32) {
    debug!(pid, "Requesting kill");
    handle.request_kill();
}

/// Runs `command` with a timeout in milliseconds; `<= 0` means none.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), oc_exec::ExecError> {
/// oc_exec::execute_with_timeout("sleep 10", 500).await?;
/// # Ok(())
/// # }
/// ```
pub async fn execute_with_timeout(command: &str, timeout_ms: i64) -> Result<(), ExecError> {
    TimeoutArbiter::new(&ExecConfig::default())
        .with_timeout(timeout_from_millis(timeout_ms))
        .run(command)
        .await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn test_timeout_interrupts_long_command() {
        let started = StdInstant::now();
        let err = execute_with_timeout("sleep 5", 200)
            .await
            .expect_err("interrupted");

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(err.interrupted(), Some(StopReason::Timeout));
        assert_eq!(err.code(), None);

        // Reaped: no such process.
        let pid = i32::try_from(err.pid().expect("pid recorded")).expect("pid fits");
        let probe = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None);
        assert_eq!(probe, Err(nix::errno::Errno::ESRCH));
    }

    #[tokio::test]
    async fn test_fast_command_finishes_before_deadline() {
        execute_with_timeout("true", 2_000).await.expect("completes");
    }

    #[tokio::test]
    async fn test_failure_before_deadline_is_not_interrupted() {
        let err = execute_with_timeout("false", 2_000)
            .await
            .expect_err("false fails");
        assert_eq!(err.code(), Some(1));
        assert_eq!(err.interrupted(), None);
    }

    #[tokio::test]
    async fn test_zero_timeout_waits_for_completion() {
        let started = StdInstant::now();
        execute_with_timeout("sleep 0.3", 0).await.expect("completes");
        assert!(started.elapsed() >= Duration::from_millis(300));

        let started = StdInstant::now();
        execute_with_timeout("sleep 0.3", -1).await.expect("completes");
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_spawn_polls_for_pid() {
        let handle = Arc::new(ProcessHandle::new(
            CommandLine::parse("sleep 5").expect("parses"),
        ));
        let arbiter = TimeoutArbiter::new(&ExecConfig::default())
            .with_timeout(Some(Duration::from_millis(1)))
            .with_spawn_poll_interval(Duration::from_millis(5));

        // The child only starts well after the deadline has passed.
        let task = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                runner::run(&handle).await
            }
        });

        let err = arbiter
            .arbitrate(&handle, task)
            .await
            .expect_err("interrupted once spawned");
        assert_eq!(err.interrupted(), Some(StopReason::Timeout));
        assert!(err.pid().is_some());
        assert!(handle.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_interrupt_token_stops_child() {
        let token = CancellationToken::new();
        let arbiter = TimeoutArbiter::new(&ExecConfig::default()).with_interrupt(token.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            token.cancel();
        });

        let started = StdInstant::now();
        let err = arbiter.run("sleep 5").await.expect_err("interrupted");
        trigger.await.expect("trigger task");

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(err.interrupted(), Some(StopReason::Interrupted));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_with_timeout() {
        let err = execute_with_timeout("definitely-not-a-real-program-oc", 500)
            .await
            .expect_err("missing binary");
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn test_with_timeout_zero_disables() {
        let arbiter = TimeoutArbiter::new(&ExecConfig::default())
            .with_timeout(Some(Duration::ZERO));
        assert_eq!(arbiter.timeout(), None);
    }
}
