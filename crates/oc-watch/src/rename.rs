//! Rename windows for the rename-as-modify heuristic.
//!
//! Atomic saves show up as `remove(P)` followed shortly by `create(P)` or a
//! rename onto `P`. Every remove on a matching path opens a window here
//! instead of going straight to the debounce table. A create, rename or
//! modify for the same path within the window takes the window and becomes a
//! single modify. A window nobody takes expires on its own timer, and only
//! then is the remove emitted.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// An open remove waiting to be paired with a re-creation.
#[derive(Debug)]
pub struct RenameWindow {
    /// Path that was removed.
    pub path: Utf8PathBuf,

    /// When the most recent remove arrived.
    pub removed_at: Instant,

    /// Raw notifications absorbed so far, including any pending change the
    /// remove superseded.
    pub count: usize,

    generation: u64,
    timer: Option<AbortHandle>,
}

impl RenameWindow {
    /// Returns `true` if the window is still open at `now`.
    #[inline]
    #[must_use]
    pub fn is_open(&self, now: Instant, period: Duration) -> bool {
        now.saturating_duration_since(self.removed_at) <= period
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Open rename windows keyed by path.
#[derive(Debug, Default)]
pub struct RenameWindows {
    windows: FxHashMap<Utf8PathBuf, RenameWindow>,
    next_generation: u64,
}

impl RenameWindows {
    /// Creates an empty set of windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or re-opens) the window for `path` and arms its expiry timer.
    ///
    /// A second remove for a path that already has a window wins: the window
    /// takes the newer timestamp and restarts its timer, and the counts add.
    /// Returns the generation handed to `arm`.
    pub fn open<F>(&mut self, path: &Utf8Path, count: usize, now: Instant, arm: F) -> u64
    where
        F: FnOnce(u64) -> AbortHandle,
    {
        self.next_generation = self.next_generation.wrapping_add(1);
        let generation = self.next_generation;

        let window = self
            .windows
            .entry(path.to_owned())
            .and_modify(|window| {
                window.cancel_timer();
                window.removed_at = now;
                window.count += count;
                window.generation = generation;
            })
            .or_insert_with(|| RenameWindow {
                path: path.to_owned(),
                removed_at: now,
                count,
                generation,
                timer: None,
            });

        window.timer = Some(arm(generation));
        generation
    }

    /// Takes the window for `path` if it is still open at `now`.
    ///
    /// An expired window is left alone and treated as absent; its own timer
    /// reports the remove.
    pub fn take_match(
        &mut self,
        path: &Utf8Path,
        now: Instant,
        period: Duration,
    ) -> Option<RenameWindow> {
        if !self.windows.get(path)?.is_open(now, period) {
            return None;
        }
        let mut window = self.windows.remove(path)?;
        window.cancel_timer();
        Some(window)
    }

    /// Removes and returns the window for `path` if `generation` is current.
    ///
    /// Called by the expiry timer.
    pub fn expire(&mut self, path: &Utf8Path, generation: u64) -> Option<RenameWindow> {
        match self.windows.get(path) {
            Some(window) if window.generation == generation => self.windows.remove(path),
            _ => None,
        }
    }

    /// Returns `true` if a window exists for `path`, open or not.
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.windows.contains_key(path)
    }

    /// Cancels every timer and drops all windows.
    pub fn clear(&mut self) {
        for (_, mut window) in self.windows.drain() {
            window.cancel_timer();
        }
    }

    /// Number of open windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if no window is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
