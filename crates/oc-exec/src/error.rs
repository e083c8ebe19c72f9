//! Error types for the oc-exec crate.
//!
//! [`ExecError`] covers a single command execution. None of its variants
//! stop the watch engine; the driver logs them and keeps going.

use std::fmt;
use std::io;
use std::process::ExitStatus;

/// Why the arbiter interrupted a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The execution timeout elapsed.
    Timeout,
    /// The operator interrupt fired.
    Interrupted,
}

impl StopReason {
    /// Returns a short lowercase label for log output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can occur while executing a command.
///
/// # Error Recovery Strategy
///
/// - **Parse / Spawn / Process / Wait**: Local to one execution - logged,
///   the next event runs normally
/// - **InterruptInstalled**: Programming error - only one [`Interrupt`]
///   may be live per process
/// - **Signal**: Delivery failed - logged, the execution result still
///   decides the outcome
///
/// [`Interrupt`]: crate::Interrupt
///
/// # Examples
///
/// ```
/// use oc_exec::ExecError;
///
/// let err = ExecError::parse("echo 'unterminated", "missing closing quote");
/// assert!(err.to_string().contains("echo 'unterminated"));
/// assert_eq!(err.code(), None);
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The command string could not be tokenized or was empty.
    #[error("cannot parse command '{command}': {reason}")]
    Parse {
        /// The command as supplied.
        command: String,
        /// Explanation from the tokenizer.
        reason: String,
    },

    /// The executable could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        /// Program name (first token).
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The process exited unsuccessfully or was killed by a signal.
    #[error("{}", describe_exit(.pid, .status, .interrupted))]
    Process {
        /// Process id, when the platform reported one.
        pid: Option<u32>,
        /// Exit status of the process.
        status: ExitStatus,
        /// Set when the arbiter interrupted the process before it exited.
        interrupted: Option<StopReason>,
    },

    /// Waiting on the child failed.
    #[error("failed waiting for process {}: {source}", display_pid(.pid))]
    Wait {
        /// Process id, when known.
        pid: Option<u32>,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An [`Interrupt`](crate::Interrupt) is already installed.
    #[error("interrupt handler is already installed")]
    InterruptInstalled,

    /// Sending or listening for a signal failed.
    #[error("signal handling failed for process {}: {source}", display_pid(.pid))]
    Signal {
        /// Target process id; `None` for the interrupt listener itself.
        pid: Option<u32>,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[allow(clippy::ref_option)]
fn display_pid(pid: &Option<u32>) -> String {
    pid.map_or_else(|| "<unknown>".to_owned(), |pid| pid.to_string())
}

#[allow(clippy::ref_option)]
fn describe_exit(
    pid: &Option<u32>,
    status: &ExitStatus,
    interrupted: &Option<StopReason>,
) -> String {
    let pid = display_pid(pid);
    match interrupted {
        Some(reason) => format!("process {pid} was interrupted ({reason}) and exited with {status}"),
        None => format!("process {pid} failed: {status}"),
    }
}

impl ExecError {
    /// Creates a new [`ExecError::Parse`] error.
    #[inline]
    pub fn parse(command: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new [`ExecError::Spawn`] error.
    #[inline]
    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates a new [`ExecError::Signal`] error.
    #[inline]
    pub fn signal(pid: Option<u32>, source: impl Into<io::Error>) -> Self {
        Self::Signal {
            pid,
            source: source.into(),
        }
    }

    /// Returns the exit code for [`ExecError::Process`], if the process
    /// exited normally.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Process { status, .. } => status.code(),
            _ => None,
        }
    }

    /// Returns the pid of the process this error concerns, when known.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        match self {
            Self::Process { pid, .. } | Self::Wait { pid, .. } | Self::Signal { pid, .. } => *pid,
            _ => None,
        }
    }

    /// Returns why the arbiter interrupted the process, if it did.
    #[must_use]
    pub const fn interrupted(&self) -> Option<StopReason> {
        match self {
            Self::Process { interrupted, .. } => *interrupted,
            _ => None,
        }
    }

    /// Marks a [`ExecError::Process`] as interrupted; other variants pass
    /// through unchanged.
    #[must_use]
    pub(crate) fn with_stop_reason(self, reason: StopReason) -> Self {
        match self {
            Self::Process { pid, status, .. } => Self::Process {
                pid,
                status,
                interrupted: Some(reason),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ExecError::parse("", "command is empty");
        assert_eq!(err.to_string(), "cannot parse command '': command is empty");
        assert_eq!(err.pid(), None);
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let err = ExecError::spawn("nope", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.to_string().starts_with("failed to start 'nope'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stop_reason_labels() {
        assert_eq!(StopReason::Timeout.to_string(), "timeout");
        assert_eq!(StopReason::Interrupted.label(), "interrupted");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_error_code_and_interruption() {
        use std::os::unix::process::ExitStatusExt;

        let failed = ExecError::Process {
            pid: Some(42),
            status: ExitStatus::from_raw(1 << 8),
            interrupted: None,
        };
        assert_eq!(failed.code(), Some(1));
        assert_eq!(failed.pid(), Some(42));
        assert!(failed.to_string().contains("process 42 failed"));

        let stopped = failed.with_stop_reason(StopReason::Timeout);
        assert_eq!(stopped.interrupted(), Some(StopReason::Timeout));
        assert!(stopped.to_string().contains("interrupted (timeout)"));
    }

    #[test]
    fn test_with_stop_reason_ignores_other_variants() {
        let err = ExecError::InterruptInstalled.with_stop_reason(StopReason::Interrupted);
        assert!(matches!(err, ExecError::InterruptInstalled));
        assert_eq!(err.interrupted(), None);
    }
}
