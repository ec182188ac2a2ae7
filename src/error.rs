//! Dispatch queue error types
//!
//! Centralized error handling using thiserror for type-safe errors.
//! Two concerns are kept separate: `QueueError` is returned synchronously
//! for misused operations, while `DispatchQueueError` is the value delivered
//! asynchronously when a step fails during execution.

use thiserror::Error;
use uuid::Uuid;

/// Errors reported synchronously to the caller of a misused operation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was cancelled (for example by its controller) before
    /// `start` was called. A cancelled queue can never start.
    #[error("dispatch queue {id} was cancelled before it could start")]
    Cancelled {
        /// Id of the cancelled queue.
        id: Uuid,
    },

    /// The main thread cannot be used to perform background work.
    #[error("the main thread cannot be used to perform background work; pass a background thread type")]
    MainThreadNotAllowed,

    /// Work was posted to a thread handler that has already been shut down.
    #[error("thread handler '{name}' was stopped and cannot accept work")]
    HandlerStopped {
        /// Name of the stopped handler.
        name: String,
    },
}

/// A step failure, carrying the failing step's position in the queue.
///
/// Delivered to the queue's error callback if one was registered with
/// [`start_with_handler`](crate::DispatchQueue::start_with_handler),
/// otherwise to the global error callback from
/// [`settings`](crate::settings), otherwise reported through the global
/// [`Logger`](crate::Logger).
#[derive(Debug, Clone, Error)]
#[error("step '{block_label}' (index {step_index}) of dispatch queue {queue_id} failed: {cause}")]
pub struct DispatchQueueError {
    /// Id of the queue the failure occurred in.
    pub queue_id: Uuid,
    /// Zero-based index of the failing step.
    pub step_index: usize,
    /// Label of the failing step. Generated unless set with
    /// [`with_block_label`](crate::DispatchQueue::with_block_label).
    pub block_label: String,
    /// Rendered failure cause (usually a panic message).
    pub cause: String,
}
