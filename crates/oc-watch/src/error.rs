//! Error types for the oc-watch crate.
//!
//! This module provides the [`WatchError`] type. It is returned from
//! [`Notify::new`](crate::Notify::new) when construction fails, and it is the
//! item type of the engine's error channel while the engine runs.

use oc_core::ConfigError;

/// Errors that can occur during file watching.
///
/// # Error Recovery Strategy
///
/// - **Config errors** ([`WatchError::Config`]): Fatal - construction aborts
/// - **Runtime missing** ([`WatchError::Runtime`]): Fatal - construction aborts
/// - **Notify errors** ([`WatchError::Notify`]): Reported on the error channel;
///   the engine keeps running and the caller decides whether to close
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - the
///   notification is skipped
///
/// # Examples
///
/// ```
/// use oc_watch::WatchError;
///
/// fn handle_error(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("Fatal watcher error: {err}");
///     } else {
///         eprintln!("Warning: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The patterns or options could not be turned into a watch set.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The underlying filesystem watcher failed.
    ///
    /// Covers descriptor exhaustion, a watch target removed externally, and
    /// backend initialization failures.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The engine was constructed outside a tokio runtime.
    #[error("watch engine requires a tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    /// A notification carried a path that is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl WatchError {
    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if the engine can keep running after this error.
    ///
    /// Anything that reaches the error channel is recoverable; only
    /// construction failures are not.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Notify(_) | Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error prevents the engine from starting.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}
