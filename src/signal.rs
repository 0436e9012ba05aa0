//! Ctrl+C handling for cooperative cancellation.
//!
//! The first SIGINT sets a shared flag that every running repair loop checks
//! before its next external call. A second SIGINT exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TinyTestError};

/// Exit code used when a second Ctrl+C forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Shared cancellation flag, optionally wired to SIGINT.
///
/// Cheap to clone; all clones observe the same flag, so one handler can be
/// handed to any number of loops running on different threads.
#[derive(Debug, Clone, Default)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Register the process-wide SIGINT handler. Can only succeed once per process.
    pub fn new() -> Result<Self> {
        let handler = Self::detached();
        let flag = Arc::clone(&handler.shutdown_flag);

        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(FORCED_EXIT_CODE);
            }
            eprintln!("\nInterrupted: stopping after the current call (Ctrl+C again to force)");
        })
        .map_err(|e| TinyTestError::SignalHandler(e.to_string()))?;

        Ok(handler)
    }

    /// A flag not connected to any signal; cancel it with [`request_shutdown`](Self::request_shutdown).
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
    }

    /// Non-blocking; safe from any thread.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn reset(&self) {
        self.shutdown_flag.store(false, Ordering::SeqCst);
    }
}
