//! Command execution with timeout arbitration.
//!
//! This crate runs one command line per call, with the child's output going
//! straight to the host's terminal, and optionally interrupts it when a
//! deadline or the operator interrupt fires first.
//!
//! # Overview
//!
//! - [`execute`]: tokenize, spawn, wait
//! - [`execute_with_timeout`] / [`TimeoutArbiter`]: race the child against a
//!   deadline and an interrupt token, sending SIGINT to stop it
//! - [`Interrupt`]: the process-wide Ctrl-C listener, exposed as a token
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use oc_core::ExecConfig;
//! use oc_exec::{Interrupt, TimeoutArbiter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let interrupt = Interrupt::install()?;
//!     let arbiter = TimeoutArbiter::new(&ExecConfig::default())
//!         .with_timeout(Some(Duration::from_secs(10)))
//!         .with_interrupt(interrupt.token());
//!
//!     if let Err(err) = arbiter.run("cargo test").await {
//!         eprintln!("{err}");
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod interrupt;
pub mod runner;
pub mod timeout;

pub use command::CommandLine;
pub use error::{ExecError, StopReason};
pub use interrupt::Interrupt;
pub use runner::{ProcessHandle, execute};
pub use timeout::{TimeoutArbiter, execute_with_timeout};
