//! Dispatchq Library
//!
//! This library provides a chainable, thread-affine task dispatch queue:
//! - Fluent builder for ordered step chains with compile-time checked
//!   payload handoff between steps
//! - Per-step target context (background threads or the serialized MAIN
//!   context) and per-step delays
//! - Timer and interval queues that re-run the whole chain on a period
//! - Cancellation groups and lifecycle-bound cancellation via controllers
//! - Pluggable thread handler factory, logger and error callbacks
//!
//! ```no_run
//! use std::time::Duration;
//!
//! let handle = dispatchq::create_dispatch_queue()
//!     .do_work(|_| 55)
//!     .do_work_after(Duration::from_secs(1), |n| n * 2)
//!     .post_main(|n| println!("result: {n}"))
//!     .start()
//!     .unwrap();
//! # drop(handle);
//! ```

pub mod controller;
pub mod error;
pub mod logger;
pub mod queue;
pub mod settings;
pub mod thread;
pub mod threader;

pub use controller::{
    CancelType, DispatchQueueController, HeadlessLifecycleOwner, LifecycleDispatchQueueController,
    LifecycleSignalSource, LifecycleSubscriber,
};
pub use error::{DispatchQueueError, QueueError};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use queue::{
    create_dispatch_queue, create_dispatch_queue_named, create_dispatch_queue_with,
    create_interval_dispatch_queue, create_interval_dispatch_queue_with,
    create_timer_dispatch_queue, DispatchQueue, DispatchQueueHandle, QueueStatus,
};
pub use settings::{DispatchErrorCallback, Settings};
pub use thread::{
    DefaultThreadHandler, DefaultThreadHandlerFactory, Task, TestThreadHandler, ThreadHandler,
    ThreadHandlerFactory, ThreadType, TokioThreadHandler,
};
