//! Shared types for the onchange workspace.
//!
//! This crate holds the pieces every other crate agrees on:
//!
//! - [`Config`], [`WatchConfig`] and [`ExecConfig`] - tunables for the watch
//!   engine and the process runner
//! - [`ConfigError`] - construction-time failures
//! - [`time`] - millisecond conversions shared by the engines and log lines
//!
//! # Crate Dependencies
//!
//! ```text
//! oc-cli ──► oc-watch ──► oc-core
//!        └─► oc-exec  ──►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod time;

pub use config::{Config, ExecConfig, WatchConfig};
pub use error::ConfigError;
