//! The watch engine.
//!
//! [`Notify`] bridges the synchronous `notify` watcher to tokio and turns raw
//! notifications into debounced [`Event`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                notify backend thread (RecommendedWatcher)        │
//! │                     callback ── unbounded send ──┐               │
//! └──────────────────────────────────────────────────│───────────────┘
//!                                                    ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         tokio runtime                            │
//! │                                                                  │
//! │  event loop ── classify ── PatternSet ──► on_notification        │
//! │                                              │                   │
//! │              ┌───────────────────────────────┤ Mutex<State>      │
//! │              ▼                               ▼                   │
//! │       RenameWindows ──expiry timer──► PendingTable ──timer──┐    │
//! │                                                             │    │
//! │                   events: mpsc::Receiver<Event> ◄───────────┘    │
//! │                   errors: mpsc::Receiver<WatchError>             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every spawned task (event loop, debounce timers, window timers, requeues)
//! selects on one shared [`CancellationToken`], so [`Notify::close`] stops all
//! of them at once.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use oc_core::WatchConfig;
use oc_core::time::as_millis;

use crate::error::WatchError;
use crate::events::{ChangeKind, Event};
use crate::pattern::PatternSet;
use crate::pending::PendingTable;
use crate::rename::RenameWindows;

type RawResult = notify::Result<notify::Event>;

/// Tables guarded by the engine's single mutex.
#[derive(Debug, Default)]
struct State {
    pending: PendingTable,
    renames: RenameWindows,
}

/// Sending halves of the public channels. Taken on close.
#[derive(Debug)]
struct Outputs {
    events: mpsc::Sender<Event>,
    errors: mpsc::Sender<WatchError>,
}

/// State shared between the engine handle and its tasks.
#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    outputs: Mutex<Option<Outputs>>,
    targets: PatternSet,
    shutdown: CancellationToken,
    closed: AtomicBool,
    pending_period_ms: AtomicU64,
    rename_window: Duration,
    detect_create: bool,
    runtime: Handle,
}

/// Debounced, pattern-filtered filesystem watcher.
///
/// # Lifecycle
///
/// 1. **Creation**: [`Notify::new`] resolves the patterns, starts the
///    backend watcher on every resolved directory, and spawns the event
///    loop on the current tokio runtime.
///
/// 2. **Reception**: read [`Notify::events`] and [`Notify::errors`]. Both
///    are ordinary bounded receivers and compose with `tokio::select!`.
///
/// 3. **Shutdown**: call [`Notify::close`] or drop the engine. Armed timers
///    are discarded and both receivers then yield `None`.
///
/// # Examples
///
/// ```no_run
/// use oc_core::WatchConfig;
/// use oc_watch::Notify;
///
/// # async fn example() -> Result<(), oc_watch::WatchError> {
/// let mut notify = Notify::new(&["src/**/*.rb"], &WatchConfig::default()).await?;
///
/// while let Some(event) = notify.events.recv().await {
///     println!("{} changed ({} notifications)", event.identifier, event.count);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Notify {
    /// Coalesced change events.
    pub events: mpsc::Receiver<Event>,

    /// Backend errors. The engine keeps running after each one.
    pub errors: mpsc::Receiver<WatchError>,

    shared: Arc<Shared>,

    /// Dropping the backend watcher stops its thread.
    watcher: Mutex<Option<RecommendedWatcher>>,

    loop_task: JoinHandle<()>,
}

impl std::fmt::Debug for Notify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notify")
            .field("watched_dirs", &self.watched_dirs())
            .field("is_closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Notify {
    /// Creates the engine and starts watching.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] if the options are out of range, a
    /// pattern is malformed, or no pattern resolves to an existing path.
    /// Returns [`WatchError::Runtime`] outside a tokio runtime and
    /// [`WatchError::Notify`] if no directory could be watched.
    #[allow(clippy::unused_async)] // Async so construction always happens inside the runtime
    pub async fn new<S: AsRef<str>>(patterns: &[S], config: &WatchConfig) -> Result<Self, WatchError> {
        config.validate()?;
        let targets = PatternSet::resolve(patterns)?;
        let runtime = Handle::try_current()?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawResult>();
        let mut watcher = notify::recommended_watcher(move |res: RawResult| {
            if raw_tx.send(res).is_err() {
                trace!("Event loop gone, dropping raw notification");
            }
        })?;

        let mut first_error = None;
        let mut watched = 0_usize;
        for dir in targets.watched_dirs() {
            match watcher.watch(dir.as_std_path(), RecursiveMode::NonRecursive) {
                Ok(()) => {
                    watched += 1;
                    debug!(dir = %dir, "Watching directory");
                }
                Err(error) => {
                    warn!(dir = %dir, error = %error, "Failed to watch directory");
                    first_error.get_or_insert(error);
                }
            }
        }
        if let (0, Some(error)) = (watched, first_error) {
            return Err(error.into());
        }

        let notify = Self::start(targets, config, runtime, raw_rx);
        *notify.watcher.lock() = Some(watcher);

        info!(
            dirs = watched,
            pending_period_ms = config.pending_period_ms,
            rename_window_ms = config.regard_rename_as_mod_period_ms,
            "Watch engine started"
        );
        Ok(notify)
    }

    /// Builds the engine around an already-resolved pattern set and spawns
    /// the event loop reading `raw_rx`.
    fn start(
        targets: PatternSet,
        config: &WatchConfig,
        runtime: Handle,
        raw_rx: mpsc::UnboundedReceiver<RawResult>,
    ) -> Self {
        let (events_tx, events) = mpsc::channel(config.channel_capacity);
        let (errors_tx, errors) = mpsc::channel(config.channel_capacity);

        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            outputs: Mutex::new(Some(Outputs {
                events: events_tx,
                errors: errors_tx,
            })),
            targets,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            pending_period_ms: AtomicU64::new(config.pending_period_ms),
            rename_window: config.rename_window(),
            detect_create: config.detect_create,
            runtime,
        });

        let loop_task = shared
            .runtime
            .spawn(run_event_loop(Arc::clone(&shared), raw_rx));

        Self {
            events,
            errors,
            shared,
            watcher: Mutex::new(None),
            loop_task,
        }
    }

    /// Sets the debounce window for entries armed after this call.
    pub fn set_pending_period(&self, period: Duration) {
        let ms = as_millis(period).max(1);
        self.shared.pending_period_ms.store(ms, Ordering::Relaxed);
        debug!(pending_period_ms = ms, "Pending period updated");
    }

    /// Injects `event` into the events channel after `delay`.
    ///
    /// The event bypasses filesystem detection entirely. A zero delay sends
    /// at once unless the channel is full. Does nothing after
    /// [`close`](Self::close).
    pub fn requeue(&self, event: Event, delay: Duration) {
        if self.is_closed() {
            debug!(identifier = %event.identifier, "Engine closed, dropping requeue");
            return;
        }

        let event = if delay.is_zero() {
            match self.shared.try_emit(event) {
                Ok(()) => return,
                Err(event) => event,
            }
        } else {
            event
        };

        trace!(identifier = %event.identifier, delay_ms = as_millis(delay), "Requeueing event");
        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            tokio::select! {
                () = shared.shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => shared.emit(event).await,
            }
        });
    }

    /// Stops watching, cancels every armed timer, and ends both channels.
    ///
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.shutdown.cancel();
        self.loop_task.abort();
        drop(self.watcher.lock().take());

        {
            let mut state = self.shared.state.lock();
            state.pending.clear();
            state.renames.clear();
        }
        drop(self.shared.outputs.lock().take());

        info!("Watch engine closed");
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Returns the directories resolved from the patterns.
    #[must_use]
    pub fn watched_dirs(&self) -> &[Utf8PathBuf] {
        self.shared.targets.watched_dirs()
    }
}

impl Drop for Notify {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_event_loop(shared: Arc<Shared>, mut raw_rx: mpsc::UnboundedReceiver<RawResult>) {
    loop {
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            raw = raw_rx.recv() => match raw {
                Some(Ok(event)) => shared.handle_raw(&event).await,
                Some(Err(error)) => shared.report(error.into()).await,
                None => break,
            },
        }
    }
    debug!("Event loop stopped");
}

/// Maps a raw notification to the paths it concerns and their kinds.
fn classify(event: &notify::Event) -> SmallVec<[(PathBuf, ChangeKind); 2]> {
    let all = |kind: ChangeKind| event.paths.iter().map(move |path| (path.clone(), kind));

    match event.kind {
        EventKind::Create(_) => all(ChangeKind::Create).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(ChangeKind::Rename).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Remove).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => SmallVec::from_buf([
                (from.clone(), ChangeKind::Remove),
                (to.clone(), ChangeKind::Rename),
            ]),
            _ => all(ChangeKind::Rename).collect(),
        },
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let kind = if path.exists() {
                    ChangeKind::Rename
                } else {
                    ChangeKind::Remove
                };
                (path.clone(), kind)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => SmallVec::new(),
        EventKind::Modify(_) => all(ChangeKind::Modify).collect(),
        EventKind::Remove(_) => all(ChangeKind::Remove).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => SmallVec::new(),
    }
}

impl Shared {
    fn pending_period(&self) -> Duration {
        Duration::from_millis(self.pending_period_ms.load(Ordering::Relaxed))
    }

    async fn handle_raw(self: &Arc<Self>, event: &notify::Event) {
        let now = Instant::now();
        for (path, kind) in classify(event) {
            let path = match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => path,
                Err(path) => {
                    self.report(WatchError::non_utf8_path(path)).await;
                    continue;
                }
            };
            let Some(identifier) = self.targets.identify(&path) else {
                trace!(path = %path, "No pattern matches path");
                continue;
            };
            self.on_notification(&identifier, kind, now);
        }
    }

    /// Applies the rename heuristic and feeds the debounce table.
    fn on_notification(self: &Arc<Self>, path: &Utf8Path, kind: ChangeKind, now: Instant) {
        trace!(path = %path, kind = %kind, "Raw notification");

        let mut state = self.state.lock();
        let State { pending, renames } = &mut *state;

        if kind == ChangeKind::Remove {
            let carried = pending.supersede(path).map_or(0, |p| p.count);
            renames.open(path, carried + 1, now, |generation| {
                self.arm_rename_timer(path.to_owned(), generation)
            });
            return;
        }

        if let Some(window) = renames.take_match(path, now, self.rename_window) {
            debug!(path = %path, count = window.count + 1, "Collapsing remove and re-create into modify");
            pending.record(path, ChangeKind::Modify, window.count + 1, now, |generation| {
                self.arm_pending_timer(path.to_owned(), generation)
            });
            return;
        }

        if kind == ChangeKind::Create && !self.detect_create && pending.get(path).is_none() {
            trace!(path = %path, "Ignoring unmatched create");
            return;
        }

        pending.record(path, kind, 1, now, |generation| {
            self.arm_pending_timer(path.to_owned(), generation)
        });
    }

    fn arm_pending_timer(self: &Arc<Self>, path: Utf8PathBuf, generation: u64) -> AbortHandle {
        let shared = Arc::clone(self);
        let period = self.pending_period();

        self.runtime
            .spawn(async move {
                tokio::select! {
                    () = shared.shutdown.cancelled() => {}
                    () = tokio::time::sleep(period) => {
                        let fired = shared.state.lock().pending.fire(&path, generation);
                        if let Some(pending) = fired {
                            shared.emit(pending.into_event()).await;
                        }
                    }
                }
            })
            .abort_handle()
    }

    /// Arms the expiry of a rename window. An unmatched window turns into a
    /// pending remove.
    fn arm_rename_timer(self: &Arc<Self>, path: Utf8PathBuf, generation: u64) -> AbortHandle {
        let shared = Arc::clone(self);
        let window = self.rename_window;

        self.runtime
            .spawn(async move {
                tokio::select! {
                    () = shared.shutdown.cancelled() => {}
                    () = tokio::time::sleep(window) => shared.expire_rename(&path, generation),
                }
            })
            .abort_handle()
    }

    fn expire_rename(self: &Arc<Self>, path: &Utf8Path, generation: u64) {
        let mut state = self.state.lock();
        let State { pending, renames } = &mut *state;

        let Some(window) = renames.expire(path, generation) else {
            return;
        };
        debug!(path = %path, count = window.count, "Rename window expired unmatched");
        pending.record(path, ChangeKind::Remove, window.count, Instant::now(), |generation| {
            self.arm_pending_timer(path.to_owned(), generation)
        });
    }

    fn events_sender(&self) -> Option<mpsc::Sender<Event>> {
        self.outputs.lock().as_ref().map(|outputs| outputs.events.clone())
    }

    /// Sends without waiting. Hands the event back if the channel is full.
    fn try_emit(&self, event: Event) -> Result<(), Event> {
        let Some(tx) = self.events_sender() else {
            return Ok(());
        };
        match tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => Ok(()),
            Err(TrySendError::Full(event)) => Err(event),
        }
    }

    async fn emit(&self, event: Event) {
        let Some(tx) = self.events_sender() else {
            return;
        };
        debug!(
            identifier = %event.identifier,
            count = event.count,
            kind = ?event.kind,
            "Emitting event"
        );
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            result = tx.send(event) => {
                if result.is_err() {
                    trace!("Events receiver dropped");
                }
            }
        }
    }

    async fn report(&self, error: WatchError) {
        warn!(error = %error, "Watch error");
        let Some(tx) = self.outputs.lock().as_ref().map(|outputs| outputs.errors.clone()) else {
            return;
        };
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            result = tx.send(error) => {
                if result.is_err() {
                    trace!("Errors receiver dropped");
                }
            }
        }
    }
}
