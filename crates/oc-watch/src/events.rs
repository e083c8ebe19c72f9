//! Event types emitted by the watch engine.
//!
//! # Event Flow
//!
//! ```text
//! raw notify::Event
//!        │ classify
//!        ▼
//!   ChangeKind per path ──► rename windows (remove only)
//!        │                        │ matched / expired
//!        ▼                        ▼
//!   PendingEvent (debounce) ──► Event on the events channel
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use tokio::time::Instant;

/// Classification of a raw filesystem notification.
///
/// The ordering is the merge priority used when several notifications
/// coalesce into one pending entry: the highest kind wins.
///
/// # Examples
///
/// ```
/// use oc_watch::ChangeKind;
///
/// assert_eq!(ChangeKind::Create.merge(ChangeKind::Modify), ChangeKind::Modify);
/// assert_eq!(ChangeKind::Modify.merge(ChangeKind::Rename), ChangeKind::Modify);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    /// A new entry appeared.
    Create,
    /// An entry appeared under this name by rename.
    Rename,
    /// Contents changed.
    Modify,
    /// The entry disappeared.
    Remove,
}

impl ChangeKind {
    /// Combines two kinds observed for the same path.
    #[inline]
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Returns a short lowercase label for log output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Rename => "rename",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A coalesced change event.
///
/// `identifier` is the changed path for filesystem events. For events
/// injected with [`Notify::requeue`](crate::Notify::requeue) it is whatever
/// the caller supplied, typically a command string, and `kind` is `None`.
///
/// # Examples
///
/// ```
/// use oc_watch::{ChangeKind, Event};
///
/// let event = Event::new("echo hi", 1);
/// assert!(event.is_requeued());
///
/// let changed = Event::changed("src/a.rb", 3, ChangeKind::Modify);
/// assert_eq!(changed.path().map(|p| p.as_str()), Some("src/a.rb"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    /// Changed path or injected identifier.
    pub identifier: String,

    /// Number of raw notifications coalesced into this event.
    pub count: usize,

    /// Classification for filesystem events; `None` for requeued events.
    pub kind: Option<ChangeKind>,
}

impl Event {
    /// Creates an event with no filesystem classification, for requeueing.
    #[inline]
    #[must_use]
    pub fn new(identifier: impl Into<String>, count: usize) -> Self {
        Self {
            identifier: identifier.into(),
            count,
            kind: None,
        }
    }

    /// Creates a filesystem change event.
    #[inline]
    #[must_use]
    pub fn changed(path: impl Into<String>, count: usize, kind: ChangeKind) -> Self {
        Self {
            identifier: path.into(),
            count,
            kind: Some(kind),
        }
    }

    /// Returns `true` if this event was injected rather than detected.
    #[inline]
    #[must_use]
    pub const fn is_requeued(&self) -> bool {
        self.kind.is_none()
    }

    /// Returns the changed path for filesystem events.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.kind.map(|_| Utf8Path::new(&self.identifier))
    }
}

/// Debounce state for one path.
///
/// Lives in the pending table only while its timer is armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    /// Path the notifications were reported for.
    pub path: Utf8PathBuf,

    /// When the first coalesced notification arrived.
    pub first_seen_at: Instant,

    /// When the most recent coalesced notification arrived.
    pub last_seen_at: Instant,

    /// Number of coalesced notifications.
    pub count: usize,

    /// Merged classification.
    pub kind: ChangeKind,
}

impl PendingEvent {
    /// Starts a new pending entry.
    #[must_use]
    pub fn new(path: Utf8PathBuf, kind: ChangeKind, count: usize, now: Instant) -> Self {
        Self {
            path,
            first_seen_at: now,
            last_seen_at: now,
            count,
            kind,
        }
    }

    /// Folds another notification into this entry.
    ///
    /// A path that reappears while its remove is still pending is reported
    /// as modified.
    pub fn touch(&mut self, kind: ChangeKind, count: usize, now: Instant) {
        self.count += count;
        self.kind = match (self.kind, kind) {
            (ChangeKind::Remove, ChangeKind::Remove) => ChangeKind::Remove,
            (ChangeKind::Remove, _) => ChangeKind::Modify,
            (current, kind) => current.merge(kind),
        };
        self.last_seen_at = now;
    }

    /// Converts the entry into the event that is emitted for it.
    #[must_use]
    pub fn into_event(self) -> Event {
        Event::changed(self.path.into_string(), self.count, self.kind)
    }
}
