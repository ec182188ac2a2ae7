//! Execution context abstraction
//!
//! A [`ThreadHandler`] is "a place work can run": it accepts closures,
//! optionally delayed, and executes them in submission order. The dispatch
//! engine never assumes a concrete threading model; it only posts work
//! through this trait. Hosts swap the [`ThreadHandlerFactory`] in the global
//! [`settings`](crate::settings) to route work onto their own threading
//! primitives (for example a UI event loop, see
//! [`TokioThreadHandler`] for an async-runtime host).

pub mod default_handler;
pub mod test_handler;
pub mod tokio_handler;

pub use default_handler::DefaultThreadHandler;
pub use test_handler::TestThreadHandler;
pub use tokio_handler::TokioThreadHandler;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueueError;

/// A unit of work submitted to a thread handler.
pub type Task = Box<dyn FnOnce() + Send>;

/// The execution contexts a dispatch queue step can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadType {
    /// The serialized main context (UI thread or headless surrogate).
    Main,
    /// The default shared background thread.
    Background,
    /// A secondary shared background thread.
    BackgroundSecondary,
    /// The shared IO thread.
    Io,
    /// The shared network thread.
    Network,
    /// A fresh thread owned by the queue that requested it.
    New,
    /// Inline execution on the calling thread, for tests.
    Test,
}

/// Abstracts a place work can run.
///
/// Contract: `post_delayed` eventually executes the task exactly once unless
/// the handler (or the process) is torn down first, and tasks with equal
/// eligibility execute in submission order.
pub trait ThreadHandler: Send + Sync {
    /// The handler's name, used for diagnostics and thread naming.
    fn name(&self) -> &str;

    /// Whether the handler is started and accepting work.
    fn is_active(&self) -> bool;

    /// Whether the caller is already executing on this context.
    fn is_current(&self) -> bool;

    /// Start the handler if it is not already running.
    fn start(&self);

    /// Schedule `task` to run on this context as soon as it is free.
    fn post(&self, task: Task) -> Result<(), QueueError> {
        self.post_delayed(Duration::ZERO, task)
    }

    /// Schedule `task` to run on this context once `delay` has elapsed.
    /// A zero delay means "as soon as the context is free", never
    /// synchronously on the caller.
    fn post_delayed(&self, delay: Duration, task: Task) -> Result<(), QueueError>;

    /// Shut the handler down. Pending tasks are discarded and later posts
    /// are rejected with [`QueueError::HandlerStopped`].
    fn quit(&self);
}

/// Produces thread handlers for the standard [`ThreadType`] contexts.
pub trait ThreadHandlerFactory: Send + Sync {
    /// Create a handler for the given context. Handlers for shared thread
    /// types are created once per process by the registry; `New` always
    /// yields a fresh thread.
    fn create(&self, thread_type: ThreadType) -> Arc<dyn ThreadHandler>;

    /// Create a handler backed by a fresh named thread.
    fn create_named(&self, name: &str) -> Arc<dyn ThreadHandler>;
}

/// The default factory: plain dedicated threads for every context, including
/// a loop-based main surrogate for headless use.
#[derive(Debug, Default)]
pub struct DefaultThreadHandlerFactory {
    new_thread_count: AtomicUsize,
}

impl DefaultThreadHandlerFactory {
    /// Create a new factory.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThreadHandlerFactory for DefaultThreadHandlerFactory {
    fn create(&self, thread_type: ThreadType) -> Arc<dyn ThreadHandler> {
        match thread_type {
            ThreadType::Main => Arc::new(DefaultThreadHandler::new("dispatchMain")),
            ThreadType::Background => Arc::new(DefaultThreadHandler::new("dispatchBackground")),
            ThreadType::BackgroundSecondary => {
                Arc::new(DefaultThreadHandler::new("dispatchBackgroundSecondary"))
            }
            ThreadType::Io => Arc::new(DefaultThreadHandler::new("dispatchIO")),
            ThreadType::Network => Arc::new(DefaultThreadHandler::new("dispatchNetwork")),
            ThreadType::New => {
                let count = self.new_thread_count.fetch_add(1, Ordering::SeqCst) + 1;
                self.create_named(&format!("dispatch{count}"))
            }
            ThreadType::Test => Arc::new(TestThreadHandler::new("dispatchTest")),
        }
    }

    fn create_named(&self, name: &str) -> Arc<dyn ThreadHandler> {
        let name = if name.is_empty() {
            let count = self.new_thread_count.fetch_add(1, Ordering::SeqCst) + 1;
            format!("dispatch{count}")
        } else {
            name.to_string()
        };
        Arc::new(DefaultThreadHandler::new(name))
    }
}
