//! Per-path debounce table.
//!
//! Each path has at most one [`PendingEvent`] and one timer. A new
//! notification for a path that is already pending aborts the old timer and
//! arms a fresh one, so the entry fires `pending_period` after the *last*
//! notification (sliding window).
//!
//! The table itself never spawns anything. Callers pass an `arm` closure that
//! starts the timer task and returns its [`AbortHandle`]. The timer task
//! later calls [`PendingTable::fire`] with the generation it was armed for.
//! A stale timer, one aborted too late to stop it reaching `fire`, finds a
//! newer generation and does nothing.

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::events::{ChangeKind, PendingEvent};

/// One armed entry: the debounce state plus its timer.
#[derive(Debug)]
struct PendingEntry {
    event: PendingEvent,
    generation: u64,
    timer: Option<AbortHandle>,
}

impl PendingEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Debounce state keyed by path.
///
/// Not synchronized on its own; the engine keeps it behind a mutex and
/// never holds that mutex across an `.await`.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: FxHashMap<Utf8PathBuf, PendingEntry>,
    next_generation: u64,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count` notifications of `kind` for `path` and re-arms its timer.
    ///
    /// `arm` receives the generation of the new timer and must return the
    /// handle of the spawned timer task. Returns that generation.
    pub fn record<F>(
        &mut self,
        path: &Utf8Path,
        kind: ChangeKind,
        count: usize,
        now: Instant,
        arm: F,
    ) -> u64
    where
        F: FnOnce(u64) -> AbortHandle,
    {
        let generation = self.bump_generation();

        let entry = self
            .entries
            .entry(path.to_owned())
            .and_modify(|entry| {
                entry.cancel_timer();
                entry.event.touch(kind, count, now);
                entry.generation = generation;
            })
            .or_insert_with(|| PendingEntry {
                event: PendingEvent::new(path.to_owned(), kind, count, now),
                generation,
                timer: None,
            });

        entry.timer = Some(arm(generation));
        generation
    }

    /// Removes and returns the entry for `path` if `generation` is current.
    pub fn fire(&mut self, path: &Utf8Path, generation: u64) -> Option<PendingEvent> {
        match self.entries.get(path) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(path).map(|entry| entry.event)
            }
            _ => None,
        }
    }

    /// Cancels and removes the entry for `path`, if any.
    ///
    /// Used when a remove supersedes a pending change.
    pub fn supersede(&mut self, path: &Utf8Path) -> Option<PendingEvent> {
        let mut entry = self.entries.remove(path)?;
        entry.cancel_timer();
        Some(entry.event)
    }

    /// Returns the pending state for `path`.
    #[must_use]
    pub fn get(&self, path: &Utf8Path) -> Option<&PendingEvent> {
        self.entries.get(path).map(|entry| &entry.event)
    }

    /// Cancels every timer and empties the table.
    pub fn clear(&mut self) {
        for (_, mut entry) in self.entries.drain() {
            entry.cancel_timer();
        }
    }

    /// Number of paths currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.wrapping_add(1);
        self.next_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use crate::events::Event;

    const PERIOD: Duration = Duration::from_millis(50);

    /// Minimal harness wiring the table to real timer tasks.
    #[derive(Clone)]
    struct Harness {
        table: Arc<Mutex<PendingTable>>,
        tx: mpsc::UnboundedSender<(Event, Instant)>,
    }

    impl Harness {
        fn new() -> (Self, mpsc::UnboundedReceiver<(Event, Instant)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let harness = Self {
                table: Arc::new(Mutex::new(PendingTable::new())),
                tx,
            };
            (harness, rx)
        }

        fn notify(&self, path: &str, kind: ChangeKind) {
            let path = Utf8PathBuf::from(path);
            let harness = self.clone();
            let timer_path = path.clone();
            self.table
                .lock()
                .record(&path, kind, 1, Instant::now(), move |generation| {
                    tokio::spawn(async move {
                        tokio::time::sleep(PERIOD).await;
                        let fired = harness.table.lock().fire(&timer_path, generation);
                        if let Some(pending) = fired {
                            let _ = harness.tx.send((pending.into_event(), Instant::now()));
                        }
                    })
                    .abort_handle()
                });
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_event() {
        let (harness, mut rx) = Harness::new();

        for _ in 0..5 {
            harness.notify("a.rb", ChangeKind::Modify);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let last = Instant::now() - Duration::from_millis(10);

        let (event, emitted_at) = rx.recv().await.expect("one event");
        assert_eq!(event, Event::changed("a.rb", 5, ChangeKind::Modify));
        assert!(emitted_at.duration_since(last) >= PERIOD);

        tokio::time::sleep(PERIOD * 4).await;
        assert!(rx.try_recv().is_err());
        assert!(harness.table.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_with_each_notification() {
        let (harness, mut rx) = Harness::new();

        harness.notify("a.rb", ChangeKind::Modify);
        tokio::time::sleep(Duration::from_millis(40)).await;
        harness.notify("a.rb", ChangeKind::Modify);
        tokio::time::sleep(Duration::from_millis(40)).await;

        // 80ms after the first notification, but only 40ms after the last.
        assert!(rx.try_recv().is_err());

        let (event, _) = rx.recv().await.expect("event after quiet period");
        assert_eq!(event.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_paths_emit_independently() {
        let (harness, mut rx) = Harness::new();

        harness.notify("a.rb", ChangeKind::Modify);
        harness.notify("b.py", ChangeKind::Modify);
        harness.notify("c.go", ChangeKind::Rename);
        harness.notify("a.rb", ChangeKind::Modify);

        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(rx.recv().await.expect("event").0);
        }
        events.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        assert_eq!(
            events,
            vec![
                Event::changed("a.rb", 2, ChangeKind::Modify),
                Event::changed("b.py", 1, ChangeKind::Modify),
                Event::changed("c.go", 1, ChangeKind::Rename),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_cancels_timer() {
        let (harness, mut rx) = Harness::new();

        harness.notify("a.rb", ChangeKind::Modify);
        harness.notify("a.rb", ChangeKind::Modify);
        let superseded = harness
            .table
            .lock()
            .supersede(Utf8Path::new("a.rb"))
            .expect("entry was pending");
        assert_eq!(superseded.count, 2);

        tokio::time::sleep(PERIOD * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_generation_does_not_fire() {
        let mut table = PendingTable::new();
        let path = Utf8Path::new("a.rb");
        let noop = || tokio::spawn(async {}).abort_handle();

        let first = table.record(path, ChangeKind::Modify, 1, Instant::now(), |_| noop());
        let second = table.record(path, ChangeKind::Modify, 1, Instant::now(), |_| noop());

        assert_ne!(first, second);
        assert!(table.fire(path, first).is_none());
        assert_eq!(table.get(path).map(|p| p.count), Some(2));
        assert_eq!(table.fire(path, second).map(|p| p.count), Some(2));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_clear_empties_table() {
        let mut table = PendingTable::new();
        let noop = || tokio::spawn(async {}).abort_handle();
        table.record(Utf8Path::new("a"), ChangeKind::Modify, 1, Instant::now(), |_| noop());
        table.record(Utf8Path::new("b"), ChangeKind::Create, 1, Instant::now(), |_| noop());
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
    }
}
