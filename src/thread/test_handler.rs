//! Inline thread handler for tests
//!
//! Runs every posted task immediately on the calling thread and ignores
//! delays, which makes queue execution synchronous and deterministic in
//! unit tests. Never use it for interval queues: with delays collapsed to
//! zero the repetition would spin forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::QueueError;
use crate::thread::{Task, ThreadHandler};

/// A [`ThreadHandler`] that executes posted work inline.
pub struct TestThreadHandler {
    name: String,
    active: AtomicBool,
}

impl TestThreadHandler {
    /// Create an inline handler. Inactive until started.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: AtomicBool::new(false),
        }
    }
}

impl ThreadHandler for TestThreadHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_current(&self) -> bool {
        true
    }

    fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn post_delayed(&self, _delay: Duration, task: Task) -> Result<(), QueueError> {
        if !self.is_active() {
            return Err(QueueError::HandlerStopped {
                name: self.name.clone(),
            });
        }
        task();
        Ok(())
    }

    fn quit(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_runs_inline_and_ignores_delay() {
        let handler = TestThreadHandler::new("inline");
        handler.start();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        handler
            .post_delayed(
                Duration::from_secs(3600),
                Box::new(move || {
                    inner.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        // The task ran inline, before post_delayed returned.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inactive_handler_rejects_posts() {
        let handler = TestThreadHandler::new("inline");
        assert!(handler.post(Box::new(|| {})).is_err());
        handler.start();
        assert!(handler.post(Box::new(|| {})).is_ok());
        handler.quit();
        assert!(handler.post(Box::new(|| {})).is_err());
    }
}
