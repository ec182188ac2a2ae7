//! Pluggable log sink
//!
//! The library never logs through a fixed backend. Everything goes through
//! the [`Logger`] installed in the global [`settings`](crate::settings),
//! which defaults to [`TracingLogger`] so hosts that install a `tracing`
//! subscriber get the library's diagnostics for free.

use std::error::Error;

/// Tag used for all diagnostics emitted by the library itself.
pub(crate) const TAG: &str = "dispatchq";

/// Sink for diagnostic and error messages emitted by the library.
///
/// Replace the global instance with
/// [`settings::set_logger`](crate::settings::set_logger) at process start.
pub trait Logger: Send + Sync {
    /// Log an informational message.
    fn log(&self, tag: &str, message: &str);

    /// Log an error message with its cause.
    fn error(&self, tag: &str, message: &str, cause: &dyn Error);
}

/// Default logger. Forwards to the `tracing` macros.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, tag: &str, message: &str) {
        tracing::info!(tag, "{}", message);
    }

    fn error(&self, tag: &str, message: &str, cause: &dyn Error) {
        tracing::error!(tag, cause = %cause, "{}", message);
    }
}

/// Logger that discards everything.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _tag: &str, _message: &str) {}

    fn error(&self, _tag: &str, _message: &str, _cause: &dyn Error) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchQueueError;
    use uuid::Uuid;

    #[test]
    fn test_loggers_accept_messages() {
        let cause = DispatchQueueError {
            queue_id: Uuid::new_v4(),
            step_index: 0,
            block_label: "label".to_string(),
            cause: "boom".to_string(),
        };
        // Neither implementation may panic, with or without a subscriber.
        TracingLogger.log(TAG, "message");
        TracingLogger.error(TAG, "message", &cause);
        NoopLogger.log(TAG, "message");
        NoopLogger.error(TAG, "message", &cause);
    }
}
