//! Millisecond helpers.
//!
//! Configuration and the command line speak in integer milliseconds, while
//! the engines work with [`Duration`]. These helpers keep the two views
//! consistent, including the "zero or negative means disabled" rule used for
//! execution timeouts.

use std::time::Duration;

/// Converts a signed millisecond timeout into an optional [`Duration`].
///
/// Values `<= 0` mean "no timeout" and return `None`.
///
/// # Examples
///
/// ```
/// use oc_core::time::timeout_from_millis;
/// use std::time::Duration;
///
/// assert_eq!(timeout_from_millis(0), None);
/// assert_eq!(timeout_from_millis(-5), None);
/// assert_eq!(timeout_from_millis(250), Some(Duration::from_millis(250)));
/// ```
#[inline]
#[must_use]
pub fn timeout_from_millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms)
        .ok()
        .filter(|&ms| ms > 0)
        .map(Duration::from_millis)
}

/// Returns a duration as whole milliseconds, saturating at `u64::MAX`.
///
/// Used for structured log fields.
#[inline]
#[must_use]
pub fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
