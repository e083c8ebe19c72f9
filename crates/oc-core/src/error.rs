//! Error types for the oc-core crate.
//!
//! This module provides the [`ConfigError`] type for failures that abort
//! startup: bad watch patterns, patterns that resolve to nothing, and
//! out-of-range options.

/// Errors that can occur while building the watch or exec configuration.
///
/// Every variant is fatal to construction. Per-execution and watch-layer
/// failures have their own error types in `oc-exec` and `oc-watch`.
///
/// # Examples
///
/// ```
/// use oc_core::ConfigError;
///
/// let error = ConfigError::invalid_pattern("src/[a.rb", "unclosed character class");
/// assert!(error.to_string().contains("src/[a.rb"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A watch pattern is not a valid glob.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern as supplied.
        pattern: String,
        /// Explanation of why the pattern is invalid.
        reason: String,
    },

    /// None of the supplied patterns resolved to an existing path.
    #[error("no pattern resolved to an existing path: {}", .0.join(", "))]
    NoWatchTarget(Vec<String>),

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while resolving a pattern.
    #[error("failed to resolve pattern: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidPattern`] error.
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}
