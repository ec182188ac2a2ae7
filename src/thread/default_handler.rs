//! Default thread handler
//!
//! One dedicated OS thread draining a min-heap of timed tasks. Tasks become
//! eligible when their due instant passes; tasks with the same due instant
//! run in submission order. The drain loop parks on a condvar until the
//! earliest task is due, so an idle handler consumes no CPU.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::QueueError;
use crate::thread::{Task, ThreadHandler};

struct TimedTask {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimedTask {}

impl PartialOrd for TimedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Natural order: earliest due first, FIFO tie-break by sequence.
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Reverse<TimedTask>>>,
    condvar: Condvar,
    quit: AtomicBool,
    seq: AtomicU64,
    worker_id: Mutex<Option<ThreadId>>,
}

/// The default [`ThreadHandler`]. Performs its work on a plain dedicated
/// thread.
pub struct DefaultThreadHandler {
    name: String,
    started: AtomicBool,
    shared: Arc<Shared>,
}

impl DefaultThreadHandler {
    /// Create a handler backed by a thread with the given name. The thread
    /// is not spawned until [`start`](ThreadHandler::start) is called.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: AtomicBool::new(false),
            shared: Arc::new(Shared {
                queue: Mutex::new(BinaryHeap::new()),
                condvar: Condvar::new(),
                quit: AtomicBool::new(false),
                seq: AtomicU64::new(0),
                worker_id: Mutex::new(None),
            }),
        }
    }

    fn drain_loop(shared: &Shared) {
        *shared.worker_id.lock().unwrap() = Some(thread::current().id());
        let mut queue = shared.queue.lock().unwrap();
        while !shared.quit.load(Ordering::SeqCst) {
            let now = Instant::now();
            match queue.peek() {
                None => {
                    queue = shared.condvar.wait(queue).unwrap();
                }
                Some(Reverse(head)) if head.due <= now => {
                    if let Some(Reverse(timed)) = queue.pop() {
                        // User work runs without the queue lock held so posts
                        // from inside a task cannot deadlock.
                        drop(queue);
                        (timed.task)();
                        queue = shared.queue.lock().unwrap();
                    }
                }
                Some(Reverse(head)) => {
                    let wait = head.due - now;
                    let (guard, _timeout) = shared.condvar.wait_timeout(queue, wait).unwrap();
                    queue = guard;
                }
            }
        }
        queue.clear();
    }
}

impl ThreadHandler for DefaultThreadHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shared.quit.load(Ordering::SeqCst)
    }

    fn is_current(&self) -> bool {
        *self.shared.worker_id.lock().unwrap() == Some(thread::current().id())
    }

    fn start(&self) {
        if self.shared.quit.load(Ordering::SeqCst) {
            warn!(handler = %self.name, "cannot restart a thread handler after quit");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || Self::drain_loop(&shared));
        if let Err(err) = spawned {
            self.started.store(false, Ordering::SeqCst);
            warn!(handler = %self.name, error = %err, "failed to spawn handler thread");
        }
    }

    fn post_delayed(&self, delay: Duration, task: Task) -> Result<(), QueueError> {
        if !self.is_active() {
            return Err(QueueError::HandlerStopped {
                name: self.name.clone(),
            });
        }
        let timed = TimedTask {
            due: Instant::now() + delay,
            seq: self.shared.seq.fetch_add(1, Ordering::SeqCst),
            task,
        };
        self.shared.queue.lock().unwrap().push(Reverse(timed));
        self.shared.condvar.notify_one();
        Ok(())
    }

    fn quit(&self) {
        if !self.shared.quit.swap(true, Ordering::SeqCst) {
            self.shared.condvar.notify_all();
        }
    }
}

impl Drop for DefaultThreadHandler {
    fn drop(&mut self) {
        self.quit();
    }
}
