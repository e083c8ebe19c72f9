//! Process-wide operator interrupt.
//!
//! At most one [`Interrupt`] is live at a time. It owns the Ctrl-C listener
//! and exposes the interrupt only as a [`CancellationToken`]; nothing else
//! in the workspace reads signal state directly.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ExecError;

/// Set while an [`Interrupt`] is installed.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installed Ctrl-C listener.
///
/// The token is cancelled on the first Ctrl-C. Later signals are swallowed.
///
/// # Examples
///
/// ```no_run
/// use oc_exec::Interrupt;
///
/// # async fn example() -> Result<(), oc_exec::ExecError> {
/// let interrupt = Interrupt::install()?;
/// let token = interrupt.token();
///
/// token.cancelled().await;
/// println!("Interrupted");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Interrupt {
    token: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl Interrupt {
    /// Installs the process-wide listener on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InterruptInstalled`] if another `Interrupt` is
    /// live, and [`ExecError::Signal`] outside a tokio runtime.
    pub fn install() -> Result<Self, ExecError> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ExecError::InterruptInstalled);
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                INSTALLED.store(false, Ordering::Release);
                return Err(ExecError::signal(None, std::io::Error::other(error)));
            }
        };

        let token = CancellationToken::new();
        let listener = runtime.spawn(listen(token.clone()));
        debug!("Interrupt listener installed");

        Ok(Self {
            token,
            listener: Some(listener),
        })
    }

    /// Returns a token that is cancelled when the interrupt fires.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns `true` once the interrupt has fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fires the interrupt without a signal, e.g. on SIGTERM.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Stops the listener and releases the process-wide slot.
    ///
    /// Calling it again does nothing.
    pub fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            INSTALLED.store(false, Ordering::Release);
            debug!("Interrupt listener removed");
        }
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn listen(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupt received");
            token.cancel();
        }
        Err(source) => {
            let error = ExecError::signal(None, source);
            warn!(error = %error, "Failed to listen for Ctrl-C");
            return;
        }
    }

    // Later presses are absorbed.
    while tokio::signal::ctrl_c().await.is_ok() {
        debug!("Interrupt already delivered, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Everything touching the process-wide slot lives in one test.
    #[tokio::test]
    async fn test_install_is_exclusive_and_teardown_releases() {
        let mut first = Interrupt::install().expect("first install");
        assert!(matches!(
            Interrupt::install(),
            Err(ExecError::InterruptInstalled)
        ));

        let token = first.token();
        assert!(!first.is_triggered());
        first.trigger();
        assert!(token.is_cancelled());
        assert!(first.is_triggered());

        first.teardown();
        first.teardown();

        let second = Interrupt::install().expect("slot released");
        drop(second);

        let third = Interrupt::install().expect("drop released the slot");
        drop(third);
    }
}
