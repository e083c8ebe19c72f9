//! Glob-pattern file watcher with per-path debouncing.
//!
//! This crate turns the raw notification stream of the `notify` crate into
//! clean "this file changed" events, bridged to a tokio context.
//!
//! # Overview
//!
//! The oc-watch crate is designed to:
//!
//! - Resolve glob patterns (`src/**/*.rb`) into a fixed set of watched
//!   directories
//! - Coalesce bursts of notifications per path with a sliding debounce window
//! - Recognize atomic saves (remove followed by re-create) as a single modify
//! - Stream events and backend errors over two bounded channels
//!
//! # Architecture
//!
//! ```text
//! notify backend ──► classify ──► rename windows ──► pending table ──► events
//!                                                                  └─► errors
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! oc-cli ──► oc-watch ──► oc-core
//!        └─► oc-exec  ──►
//! ```
//!
//! # Usage
//!
//! ## Basic Watching
//!
//! ```no_run
//! use oc_core::WatchConfig;
//! use oc_watch::Notify;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut notify = Notify::new(&["*.rb"], &WatchConfig::default()).await?;
//!
//!     while let Some(event) = notify.events.recv().await {
//!         println!("{} changed", event.identifier);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Using with `tokio::select!`
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use oc_core::WatchConfig;
//! use oc_watch::{Event, Notify};
//!
//! # async fn example() -> Result<(), oc_watch::WatchError> {
//! let mut notify = Notify::new(&["src/**/*.go"], &WatchConfig::default()).await?;
//!
//! loop {
//!     tokio::select! {
//!         Some(event) = notify.events.recv() => {
//!             println!("{} ({:?})", event.identifier, event.kind);
//!             notify.requeue(Event::new("go test ./...", 1), Duration::from_millis(100));
//!         }
//!         Some(error) = notify.errors.recv() => {
//!             eprintln!("Warning: {error}");
//!         }
//!         else => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Construction fails with a fatal [`WatchError`]. Once running, backend
//! failures arrive on [`Notify::errors`] and the engine keeps going:
//!
//! ```
//! use oc_watch::WatchError;
//!
//! fn handle_watch_error(err: &WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {err}");
//!     } else {
//!         eprintln!("Warning: {err}");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod notify;
pub mod pattern;
pub mod pending;
pub mod rename;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{ChangeKind, Event, PendingEvent};

// Re-export engine types
pub use self::notify::Notify;
pub use pattern::{PatternSet, WatchTarget};
