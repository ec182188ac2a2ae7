//! Tokio runtime adapter
//!
//! Lets hosts that already run a tokio runtime route dispatch queue work
//! onto it instead of the library's dedicated threads. Plays the same role
//! the platform adapter plays on UI hosts: install a custom
//! [`ThreadHandlerFactory`](crate::ThreadHandlerFactory) that hands out
//! `TokioThreadHandler`s for the contexts the runtime should own.
//!
//! Step bodies run directly on runtime workers, so long-blocking transforms
//! should stay on the default dedicated-thread handlers instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::QueueError;
use crate::thread::{Task, ThreadHandler};

/// A [`ThreadHandler`] that posts work onto a tokio runtime.
pub struct TokioThreadHandler {
    name: String,
    handle: Handle,
    active: AtomicBool,
}

impl TokioThreadHandler {
    /// Create a handler that spawns onto the given runtime handle.
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
            active: AtomicBool::new(true),
        }
    }

    /// Create a handler for the runtime the caller is currently inside.
    ///
    /// # Panics
    ///
    /// Panics like [`Handle::current`] when called outside a runtime.
    pub fn current(name: impl Into<String>) -> Self {
        Self::new(name, Handle::current())
    }
}

impl ThreadHandler for TokioThreadHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_current(&self) -> bool {
        // A multi-threaded runtime has no single affinity thread; report
        // whether the caller is inside *some* runtime context.
        Handle::try_current().is_ok()
    }

    fn start(&self) {
        // The host owns the runtime's life cycle; nothing to spawn here.
        self.active.store(true, Ordering::SeqCst);
    }

    fn post_delayed(&self, delay: Duration, task: Task) -> Result<(), QueueError> {
        if !self.is_active() {
            return Err(QueueError::HandlerStopped {
                name: self.name.clone(),
            });
        }
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task();
        });
        Ok(())
    }

    fn quit(&self) {
        // Stops accepting work; the runtime itself is left to the host.
        self.active.store(false, Ordering::SeqCst);
    }
}
