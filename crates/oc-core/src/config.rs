//! Configuration structures for onchange.
//!
//! - [`WatchConfig`] - debounce window, rename window, create detection
//! - [`ExecConfig`] - execution timeout and spawn polling
//! - [`Config`] - root configuration combining both
//!
//! All types implement [`Default`] and deserialize with missing fields
//! filled from the defaults. Loading them from a file is left to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::timeout_from_millis;

/// Configuration for the watch engine.
///
/// # Examples
///
/// ```
/// use oc_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.pending_period_ms, 100);
/// assert_eq!(config.regard_rename_as_mod_period_ms, 1000);
/// assert!(!config.detect_create);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window in milliseconds.
    ///
    /// Notifications for one path are coalesced until the path has been
    /// quiet for this long.
    pub pending_period_ms: u64,

    /// Whether create notifications are surfaced on their own.
    ///
    /// Most editors create and then write, so the write is usually enough.
    pub detect_create: bool,

    /// Window in milliseconds within which a remove followed by a create of
    /// the same path is reported as a single modify.
    pub regard_rename_as_mod_period_ms: u64,

    /// Capacity of each output channel.
    pub channel_capacity: usize,
}

impl WatchConfig {
    /// Returns the debounce window.
    #[inline]
    #[must_use]
    pub const fn pending_period(&self) -> Duration {
        Duration::from_millis(self.pending_period_ms)
    }

    /// Returns the rename-coalescing window.
    #[inline]
    #[must_use]
    pub const fn rename_window(&self) -> Duration {
        Duration::from_millis(self.regard_rename_as_mod_period_ms)
    }

    /// Checks that every option is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pending_period_ms == 0 {
            return Err(ConfigError::invalid_option(
                "pending_period_ms",
                "must be greater than zero",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            pending_period_ms: 100,
            detect_create: false,
            regard_rename_as_mod_period_ms: 1000,
            channel_capacity: 100,
        }
    }
}

/// Configuration for command execution.
///
/// # Examples
///
/// ```
/// use oc_core::ExecConfig;
///
/// let config = ExecConfig::default();
/// assert_eq!(config.timeout(), None);
/// assert_eq!(config.spawn_poll_interval_ms, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Execution timeout in milliseconds. `<= 0` disables the timeout.
    pub timeout_ms: i64,

    /// How often a fired deadline re-checks for a pid that has not been
    /// recorded yet, in milliseconds.
    pub spawn_poll_interval_ms: u64,
}

impl ExecConfig {
    /// Returns the timeout, or `None` when disabled.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_millis(self.timeout_ms)
    }

    /// Returns the spawn polling interval.
    #[inline]
    #[must_use]
    pub const fn spawn_poll_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_poll_interval_ms)
    }

    /// Checks that every option is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spawn_poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "spawn_poll_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            spawn_poll_interval_ms: 5,
        }
    }
}

/// Root configuration for onchange.
///
/// # Examples
///
/// ```
/// use oc_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watch engine configuration.
    pub watch: WatchConfig,

    /// Command execution configuration.
    pub exec: ExecConfig,
}

impl Config {
    /// Validates both sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.watch.validate()?;
        self.exec.validate()
    }
}
