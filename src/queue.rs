//! Dispatch queue builder and execution engine
//!
//! A dispatch queue is an ordered sequence of transformation steps, each
//! annotated with a target execution context and an optional delay. The
//! queue is assembled with a fluent, type-narrowing builder: every append
//! consumes the builder and returns one whose type parameter is the new
//! step's output, so adjacent step signatures are checked at compile time
//! and appending after `start` is unrepresentable.
//!
//! Execution is a chain of asynchronous handoffs: each step's completion
//! schedules the next step on *its* target context. Exactly one step of a
//! queue is in flight at any instant, which is what lets the output of step
//! N become the input of step N+1 without extra synchronization. Interval
//! queues restart from the first step after each successful pass.
//!
//! Cancellation is cooperative: it is checked on the target context
//! immediately before a step's transform runs, so a step that already
//! started always completes, and nothing after it runs.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::controller::{
    CancelType, ControllerHandle, DispatchQueueController, LifecycleDispatchQueueController,
};
use crate::error::{DispatchQueueError, QueueError};
use crate::logger::TAG;
use crate::settings::{self, DispatchErrorCallback};
use crate::thread::{Task, ThreadHandler, ThreadType};
use crate::threader;

type Payload = Box<dyn Any + Send>;
type StepFn = Box<dyn Fn(Payload) -> Result<Payload, String> + Send + Sync>;
type RecoverFn = Box<dyn Fn(DispatchQueueError) -> Result<Payload, String> + Send + Sync>;

/// Execution state of a dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Assembled but not yet started.
    Built,
    /// Steps are executing (or an interval pass is pending).
    Running,
    /// All steps completed. Terminal; interval queues never report this
    /// and instead stay `Running` across passes.
    Completed,
    /// Cancelled before or during execution. Terminal.
    Cancelled,
    /// A step failed without recovery. Terminal.
    Failed,
}

struct Step {
    label: String,
    delay: Duration,
    handler: Arc<dyn ThreadHandler>,
    work: StepFn,
    recover: Option<RecoverFn>,
}

struct CoreState {
    status: QueueStatus,
    steps: Arc<Vec<Step>>,
    completed_passes: u64,
    error_callback: Option<DispatchErrorCallback>,
    controller: Option<Weak<dyn ControllerHandle>>,
    owned_handlers: Vec<Arc<dyn ThreadHandler>>,
}

/// Resources released exactly once, on reaching a terminal state.
struct Cleanup {
    controller: Option<Weak<dyn ControllerHandle>>,
    owned_handlers: Vec<Arc<dyn ThreadHandler>>,
}

impl CoreState {
    fn take_cleanup(&mut self) -> Cleanup {
        Cleanup {
            controller: self.controller.take(),
            owned_handlers: std::mem::take(&mut self.owned_handlers),
        }
    }
}

/// Shared execution state of one dispatch queue. Controllers hold this
/// weakly; the builder and the started handle hold it strongly.
pub(crate) struct QueueCore {
    id: Uuid,
    interval: Option<Duration>,
    initial_delay: Duration,
    state: Mutex<CoreState>,
}

impl QueueCore {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> QueueStatus {
        self.state.lock().unwrap().status
    }

    /// Swap the controller binding, returning the previous one so the
    /// caller can deregister from it.
    fn replace_controller(
        &self,
        controller: Option<Weak<dyn ControllerHandle>>,
    ) -> Option<Weak<dyn ControllerHandle>> {
        std::mem::replace(&mut self.state.lock().unwrap().controller, controller)
    }

    /// Cooperatively cancel the queue. In-flight steps complete; nothing
    /// after them runs. A no-op on queues already in a terminal state.
    pub(crate) fn cancel(self: &Arc<Self>) {
        let cleanup = {
            let mut state = self.state.lock().unwrap();
            if matches!(
                state.status,
                QueueStatus::Completed | QueueStatus::Cancelled | QueueStatus::Failed
            ) {
                return;
            }
            state.status = QueueStatus::Cancelled;
            state.error_callback = None;
            state.take_cleanup()
        };
        debug!(queue_id = %self.id, "dispatch queue cancelled");
        self.finish(cleanup);
    }

    /// Deregister from the controller and shut down queue-owned threads.
    fn finish(&self, cleanup: Cleanup) {
        if let Some(controller) = cleanup.controller.and_then(|weak| weak.upgrade()) {
            controller.unmanage_id(self.id);
        }
        for handler in cleanup.owned_handlers {
            handler.quit();
        }
    }

    fn schedule_step(
        self: &Arc<Self>,
        index: usize,
        extra_delay: Duration,
        payload: Payload,
    ) -> Result<(), QueueError> {
        let steps = {
            let state = self.state.lock().unwrap();
            if state.status != QueueStatus::Running {
                return Ok(());
            }
            Arc::clone(&state.steps)
        };
        let step = &steps[index];
        let core = Arc::clone(self);
        let task: Task = Box::new(move || core.run_step(index, payload));
        step.handler.post_delayed(step.delay + extra_delay, task)
    }

    /// Mid-chain scheduling failure: the caller already got its handle, so
    /// the queue folds into cancellation instead of surfacing an error.
    fn schedule_step_or_cancel(self: &Arc<Self>, index: usize, extra_delay: Duration, payload: Payload) {
        if let Err(err) = self.schedule_step(index, extra_delay, payload) {
            warn!(queue_id = %self.id, error = %err, "failed to schedule step; cancelling queue");
            self.cancel();
        }
    }

    fn run_step(self: &Arc<Self>, index: usize, payload: Payload) {
        // Cancellation check on the target context, immediately before the
        // transform runs. The single status field makes the race with
        // cancel() well defined: the step either runs to completion or is
        // skipped entirely.
        let steps = {
            let state = self.state.lock().unwrap();
            if state.status != QueueStatus::Running {
                return;
            }
            Arc::clone(&state.steps)
        };
        let step = &steps[index];
        match (step.work)(payload) {
            Ok(output) => self.advance(index, output, &steps),
            Err(cause) => {
                let error = DispatchQueueError {
                    queue_id: self.id,
                    step_index: index,
                    block_label: step.label.clone(),
                    cause,
                };
                match &step.recover {
                    Some(recover) => match recover(error.clone()) {
                        Ok(output) => self.advance(index, output, &steps),
                        Err(recover_cause) => self.fail(DispatchQueueError {
                            cause: recover_cause,
                            ..error
                        }),
                    },
                    None => self.fail(error),
                }
            }
        }
    }

    fn advance(self: &Arc<Self>, index: usize, output: Payload, steps: &Arc<Vec<Step>>) {
        let next = index + 1;
        if next < steps.len() {
            self.schedule_step_or_cancel(next, Duration::ZERO, output);
        } else {
            self.complete();
        }
    }

    fn complete(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if state.status != QueueStatus::Running {
            return;
        }
        state.completed_passes += 1;
        match self.interval {
            Some(interval) => {
                drop(state);
                // Re-arm: back to the first step with the unit sentinel.
                self.schedule_step_or_cancel(0, interval, Box::new(()));
            }
            None => {
                state.status = QueueStatus::Completed;
                let cleanup = state.take_cleanup();
                drop(state);
                debug!(queue_id = %self.id, "dispatch queue completed");
                self.finish(cleanup);
            }
        }
    }

    /// Halt the queue at a failed step: no further steps, no interval
    /// re-arm. The failure goes to the queue's own callback, else the
    /// global callback, else the logger; callbacks run on the MAIN context.
    /// The logger path uses [`Logger::error`](crate::Logger::error) rather
    /// than a plain warning so the failure keeps its cause attached.
    fn fail(self: &Arc<Self>, error: DispatchQueueError) {
        let (callback, cleanup) = {
            let mut state = self.state.lock().unwrap();
            if state.status != QueueStatus::Running {
                return;
            }
            state.status = QueueStatus::Failed;
            let callback = state
                .error_callback
                .take()
                .or_else(settings::global_error_callback);
            (callback, state.take_cleanup())
        };
        match callback {
            Some(callback) => {
                let posted = threader::handler_for(ThreadType::Main).post(Box::new(move || {
                    callback(error);
                }));
                if let Err(err) = posted {
                    warn!(error = %err, "could not deliver dispatch queue error to main context");
                }
            }
            None => {
                settings::logger()
                    .error(TAG, "unhandled dispatch queue error; dropping queue", &error);
            }
        }
        self.finish(cleanup);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}

fn wrap_step<T, U, F>(func: F) -> StepFn
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    Box::new(move |payload: Payload| {
        let input = payload
            .downcast::<T>()
            .map_err(|_| "step payload type mismatch".to_string())?;
        match catch_unwind(AssertUnwindSafe(|| func(*input))) {
            Ok(output) => Ok(Box::new(output) as Payload),
            Err(panic) => Err(panic_message(panic)),
        }
    })
}

/// A dispatch queue under construction.
///
/// The type parameter is the output type of the most recently appended
/// step (`()` for a fresh queue); the next appended transform must accept
/// it as input. Builder methods consume `self`, so a queue cannot be
/// mutated once [`start`](Self::start) has been called.
pub struct DispatchQueue<R> {
    core: Arc<QueueCore>,
    steps: Vec<Step>,
    background: Arc<dyn ThreadHandler>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Send + 'static> DispatchQueue<R> {
    /// The queue's id, stable across its whole lifecycle.
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Append a step that runs on the queue's background context.
    pub fn do_work<U, F>(self, func: F) -> DispatchQueue<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        self.do_work_after(Duration::ZERO, func)
    }

    /// Append a background step that becomes eligible only after `delay`.
    pub fn do_work_after<U, F>(self, delay: Duration, func: F) -> DispatchQueue<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let handler = Arc::clone(&self.background);
        self.push_step(delay, handler, func)
    }

    /// Alias for [`do_work`](Self::do_work), for transform-flavored call
    /// sites.
    pub fn map<U, F>(self, func: F) -> DispatchQueue<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        self.do_work(func)
    }

    /// Append a step that runs on the MAIN context.
    pub fn post_main<U, F>(self, func: F) -> DispatchQueue<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        self.post_main_after(Duration::ZERO, func)
    }

    /// Append a MAIN-context step that becomes eligible only after `delay`.
    pub fn post_main_after<U, F>(self, delay: Duration, func: F) -> DispatchQueue<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let handler = threader::handler_for(ThreadType::Main);
        self.push_step(delay, handler, func)
    }

    fn push_step<U, F>(
        mut self,
        delay: Duration,
        handler: Arc<dyn ThreadHandler>,
        func: F,
    ) -> DispatchQueue<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        self.steps.push(Step {
            label: Uuid::new_v4().to_string(),
            delay,
            handler,
            work: wrap_step(func),
            recover: None,
        });
        DispatchQueue {
            core: self.core,
            steps: self.steps,
            background: self.background,
            _marker: PhantomData,
        }
    }

    /// Label the most recently appended step. Labels surface in
    /// [`DispatchQueueError`] to identify the failing step.
    pub fn with_block_label(mut self, label: impl Into<String>) -> Self {
        match self.steps.last_mut() {
            Some(step) => step.label = label.into(),
            None => debug!(queue_id = %self.core.id, "block label set before any step; ignored"),
        }
        self
    }

    /// Attach a recovery function to the most recently appended step. If
    /// that step fails, the function runs on the step's own context and its
    /// return value replaces the step output, letting the queue continue.
    /// A failure inside the recovery function propagates as an ordinary
    /// step failure.
    pub fn do_on_error<F>(mut self, func: F) -> Self
    where
        F: Fn(DispatchQueueError) -> R + Send + Sync + 'static,
    {
        match self.steps.last_mut() {
            Some(step) => {
                step.recover = Some(Box::new(move |error| {
                    match catch_unwind(AssertUnwindSafe(|| func(error))) {
                        Ok(output) => Ok(Box::new(output) as Payload),
                        Err(panic) => Err(panic_message(panic)),
                    }
                }));
            }
            None => debug!(queue_id = %self.core.id, "recovery set before any step; ignored"),
        }
        self
    }

    /// Register the queue with a controller for bulk cancellation. A queue
    /// is managed by at most one controller; a previous binding is
    /// replaced.
    pub fn managed_by(self, controller: &Arc<DispatchQueueController>) -> Self {
        let handle: Arc<dyn ControllerHandle> = Arc::clone(controller) as _;
        self.rebind_controller(Arc::downgrade(&handle));
        controller.manage_core(&self.core);
        self
    }

    /// Bind the queue's cancellation to a lifecycle signal: when the
    /// controller receives the matching [`CancelType`], the queue is
    /// cancelled at the next safe point.
    pub fn managed_by_lifecycle(
        self,
        controller: &Arc<LifecycleDispatchQueueController>,
        cancel_type: CancelType,
    ) -> Self {
        let handle: Arc<dyn ControllerHandle> = Arc::clone(controller) as _;
        self.rebind_controller(Arc::downgrade(&handle));
        controller.manage_core_with(&self.core, cancel_type);
        self
    }

    fn rebind_controller(&self, controller: Weak<dyn ControllerHandle>) {
        if let Some(previous) = self
            .core
            .replace_controller(Some(controller))
            .and_then(|weak| weak.upgrade())
        {
            previous.unmanage_id(self.core.id);
        }
    }

    /// Start the queue. The first step is scheduled asynchronously on its
    /// target context; no step runs synchronously on the caller.
    ///
    /// Fails with [`QueueError::Cancelled`] if a controller already
    /// cancelled the queue before it started, and with
    /// [`QueueError::HandlerStopped`] if the first step's context was shut
    /// down; in both cases the queue ends cancelled and nothing runs.
    pub fn start(self) -> Result<DispatchQueueHandle, QueueError> {
        self.start_inner(None)
    }

    /// Alias for [`start`](Self::start).
    pub fn run(self) -> Result<DispatchQueueHandle, QueueError> {
        self.start()
    }

    /// Start the queue with an error callback. If any step fails without
    /// recovery, the callback receives the [`DispatchQueueError`] on the
    /// MAIN context and the queue halts.
    pub fn start_with_handler<F>(self, on_error: F) -> Result<DispatchQueueHandle, QueueError>
    where
        F: Fn(DispatchQueueError) + Send + Sync + 'static,
    {
        self.start_inner(Some(Arc::new(on_error)))
    }

    fn start_inner(
        self,
        error_callback: Option<DispatchErrorCallback>,
    ) -> Result<DispatchQueueHandle, QueueError> {
        let DispatchQueue { core, steps, .. } = self;
        let empty_cleanup = {
            let mut state = core.state.lock().unwrap();
            if state.status == QueueStatus::Cancelled {
                return Err(QueueError::Cancelled { id: core.id });
            }
            state.error_callback = error_callback;
            if steps.is_empty() {
                // Nothing to schedule: terminal immediately.
                state.status = QueueStatus::Completed;
                state.completed_passes = 1;
                Some(state.take_cleanup())
            } else {
                state.steps = Arc::new(steps);
                state.status = QueueStatus::Running;
                if state.controller.is_none() && settings::log_warnings_enabled() {
                    let id = core.id;
                    settings::logger().log(
                        TAG,
                        &format!(
                            "no controller set for dispatch queue {id}; long running queues \
                             without a controller cannot be cancelled by their owner"
                        ),
                    );
                }
                None
            }
        };
        match empty_cleanup {
            Some(cleanup) => {
                if core.interval.is_some() {
                    warn!(queue_id = %core.id, "interval configured on an empty dispatch queue; nothing to repeat");
                }
                core.finish(cleanup);
            }
            None => {
                if let Err(err) = core.schedule_step(0, core.initial_delay, Box::new(())) {
                    warn!(queue_id = %core.id, error = %err, "could not schedule first step");
                    core.cancel();
                    return Err(err);
                }
            }
        }
        Ok(DispatchQueueHandle { core })
    }
}

/// Handle to a started (or terminally finished) dispatch queue.
#[derive(Clone)]
pub struct DispatchQueueHandle {
    core: Arc<QueueCore>,
}

impl DispatchQueueHandle {
    /// The queue's id.
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Current execution state.
    pub fn status(&self) -> QueueStatus {
        self.core.status()
    }

    /// Whether the queue was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status() == QueueStatus::Cancelled
    }

    /// Number of full passes over the step sequence completed so far.
    /// At most 1 for non-interval queues; grows without bound for interval
    /// queues.
    pub fn completed_passes(&self) -> u64 {
        self.core.state.lock().unwrap().completed_passes
    }

    /// Cooperatively cancel the queue: the next not-yet-started step (and
    /// everything after it) will not run. A no-op on queues already in a
    /// terminal state.
    pub fn cancel(&self) {
        self.core.cancel();
    }
}

fn build_queue(
    handler: Arc<dyn ThreadHandler>,
    owned: bool,
    initial_delay: Duration,
    interval: Option<Duration>,
) -> DispatchQueue<()> {
    let owned_handlers = if owned {
        vec![Arc::clone(&handler)]
    } else {
        Vec::new()
    };
    let core = Arc::new(QueueCore {
        id: Uuid::new_v4(),
        interval,
        initial_delay,
        state: Mutex::new(CoreState {
            status: QueueStatus::Built,
            steps: Arc::new(Vec::new()),
            completed_passes: 0,
            error_callback: None,
            controller: None,
            owned_handlers,
        }),
    });
    DispatchQueue {
        core,
        steps: Vec::new(),
        background: handler,
        _marker: PhantomData,
    }
}

fn checked_background(thread_type: ThreadType) -> Result<Arc<dyn ThreadHandler>, QueueError> {
    if thread_type == ThreadType::Main {
        return Err(QueueError::MainThreadNotAllowed);
    }
    Ok(threader::handler_for(thread_type))
}

/// Create a dispatch queue whose background steps run on the default
/// background context.
pub fn create_dispatch_queue() -> DispatchQueue<()> {
    build_queue(
        threader::handler_for(ThreadType::Background),
        false,
        Duration::ZERO,
        None,
    )
}

/// Create a dispatch queue whose background steps run on the given
/// context. `ThreadType::Main` is rejected: the main context is reserved
/// for [`post_main`](DispatchQueue::post_main) steps.
pub fn create_dispatch_queue_with(
    thread_type: ThreadType,
) -> Result<DispatchQueue<()>, QueueError> {
    let handler = checked_background(thread_type)?;
    Ok(build_queue(
        handler,
        thread_type == ThreadType::New,
        Duration::ZERO,
        None,
    ))
}

/// Create a dispatch queue backed by a fresh thread with the given name.
/// The thread is shut down when the queue reaches a terminal state.
pub fn create_dispatch_queue_named(name: &str) -> DispatchQueue<()> {
    build_queue(threader::named_handler(name), true, Duration::ZERO, None)
}

/// Create a dispatch queue whose first step becomes eligible only after
/// `delay`.
pub fn create_timer_dispatch_queue(delay: Duration) -> DispatchQueue<()> {
    build_queue(
        threader::handler_for(ThreadType::Background),
        false,
        delay,
        None,
    )
}

/// Create a dispatch queue that repeats its whole step sequence,
/// indefinitely, with `interval` between the end of one successful pass and
/// the start of the next. The first pass starts immediately. Cancellation
/// is the only deliberate stop mechanism; a failed pass terminates the
/// queue permanently.
pub fn create_interval_dispatch_queue(interval: Duration) -> DispatchQueue<()> {
    build_queue(
        threader::handler_for(ThreadType::Background),
        false,
        Duration::ZERO,
        Some(interval),
    )
}

/// Interval queue variant with an explicit background context.
pub fn create_interval_dispatch_queue_with(
    interval: Duration,
    thread_type: ThreadType,
) -> Result<DispatchQueue<()>, QueueError> {
    let handler = checked_background(thread_type)?;
    Ok(build_queue(
        handler,
        thread_type == ThreadType::New,
        Duration::ZERO,
        Some(interval),
    ))
}
