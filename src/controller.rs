//! Queue controllers and lifecycle-bound cancellation
//!
//! A [`DispatchQueueController`] owns a set of queues and can cancel all of
//! them at once. [`LifecycleDispatchQueueController`] extends that with
//! per-signal member sets so an external owner's lifecycle (paused, stopped,
//! destroyed) cancels exactly the queues bound to that signal. Owners are
//! modeled as an abstract [`LifecycleSignalSource`] the controller
//! subscribes to; a platform adapter translates native lifecycle callbacks
//! into [`CancelType`] signals.
//!
//! Controllers hold only weak references, so membership never keeps a
//! finished queue alive; queues remove themselves on reaching a terminal
//! state.

use std::sync::{Arc, Mutex, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use uuid::Uuid;

use crate::queue::QueueCore;

/// Lifecycle signals a queue's cancellation can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelType {
    /// Cancel when the owner is paused.
    Paused,
    /// Cancel when the owner is stopped.
    Stopped,
    /// Cancel when the owner is destroyed.
    Destroyed,
}

/// Internal handle queues keep to deregister themselves on terminal state.
pub(crate) trait ControllerHandle: Send + Sync {
    fn unmanage_id(&self, id: Uuid);
}

fn drain_members(members: &Mutex<Vec<Weak<QueueCore>>>) -> Vec<Arc<QueueCore>> {
    members
        .lock()
        .unwrap()
        .drain(..)
        .filter_map(|weak| weak.upgrade())
        .collect()
}

fn remove_member(members: &Mutex<Vec<Weak<QueueCore>>>, id: Uuid) {
    members
        .lock()
        .unwrap()
        .retain(|weak| weak.upgrade().is_some_and(|core| core.id() != id));
}

/// Manages dispatch queues and cancels them at the appropriate time.
#[derive(Default)]
pub struct DispatchQueueController {
    members: Mutex<Vec<Weak<QueueCore>>>,
}

impl DispatchQueueController {
    /// Create an empty controller. Wrap it in an [`Arc`] to attach queues
    /// via [`managed_by`](crate::DispatchQueue::managed_by).
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queues currently managed.
    pub fn managed_count(&self) -> usize {
        self.members
            .lock()
            .unwrap()
            .iter()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    }

    /// Whether the queue with the given id is currently managed.
    pub fn is_managing(&self, id: Uuid) -> bool {
        self.members
            .lock()
            .unwrap()
            .iter()
            .any(|weak| weak.upgrade().is_some_and(|core| core.id() == id))
    }

    /// Cancel every managed queue that has not yet reached a terminal
    /// state. All queues are unmanaged afterwards.
    pub fn cancel_all_dispatch(&self) {
        let members = drain_members(&self.members);
        debug!(count = members.len(), "cancelling all managed dispatch queues");
        for core in members {
            core.cancel();
        }
    }

    /// Cancel (and unmanage) the managed queues with the given ids.
    pub fn cancel_dispatch(&self, ids: &[Uuid]) {
        let mut cancelled = Vec::new();
        {
            let mut members = self.members.lock().unwrap();
            members.retain(|weak| match weak.upgrade() {
                Some(core) if ids.contains(&core.id()) => {
                    cancelled.push(core);
                    false
                }
                Some(_) => true,
                None => false,
            });
        }
        for core in cancelled {
            core.cancel();
        }
    }

    pub(crate) fn manage_core(&self, core: &Arc<QueueCore>) {
        self.members.lock().unwrap().push(Arc::downgrade(core));
    }
}

impl ControllerHandle for DispatchQueueController {
    fn unmanage_id(&self, id: Uuid) {
        remove_member(&self.members, id);
    }
}

/// A controller driven by an external owner's lifecycle.
///
/// Queues are bound with a [`CancelType`]; firing the matching signal on the
/// owner cancels exactly those queues (destruction cancels everything).
#[derive(Default)]
pub struct LifecycleDispatchQueueController {
    inner: DispatchQueueController,
    paused: Mutex<Vec<Weak<QueueCore>>>,
    stopped: Mutex<Vec<Weak<QueueCore>>>,
    destroyed: Mutex<Vec<Weak<QueueCore>>>,
}

impl LifecycleDispatchQueueController {
    /// Create an empty lifecycle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this controller to an owner's lifecycle signals.
    pub fn subscribe_to(self: &Arc<Self>, source: &dyn LifecycleSignalSource) {
        let subscriber: Arc<dyn LifecycleSubscriber> = Arc::clone(self) as _;
        source.subscribe(Arc::downgrade(&subscriber));
    }

    /// Number of queues currently managed, across all cancel types.
    pub fn managed_count(&self) -> usize {
        self.inner.managed_count()
    }

    /// Whether the queue with the given id is currently managed.
    pub fn is_managing(&self, id: Uuid) -> bool {
        self.inner.is_managing(id)
    }

    /// Cancel all queues bound with [`CancelType::Paused`].
    pub fn cancel_all_paused(&self) {
        for core in drain_members(&self.paused) {
            core.cancel();
        }
    }

    /// Cancel all queues bound with [`CancelType::Stopped`].
    pub fn cancel_all_stopped(&self) {
        for core in drain_members(&self.stopped) {
            core.cancel();
        }
    }

    /// Cancel every managed queue, whatever it was bound with.
    pub fn cancel_all_destroyed(&self) {
        self.paused.lock().unwrap().clear();
        self.stopped.lock().unwrap().clear();
        self.destroyed.lock().unwrap().clear();
        self.inner.cancel_all_dispatch();
    }

    /// Same as [`cancel_all_destroyed`](Self::cancel_all_destroyed).
    pub fn cancel_all_dispatch(&self) {
        self.cancel_all_destroyed();
    }

    pub(crate) fn manage_core_with(&self, core: &Arc<QueueCore>, cancel_type: CancelType) {
        self.inner.manage_core(core);
        let set = match cancel_type {
            CancelType::Paused => &self.paused,
            CancelType::Stopped => &self.stopped,
            CancelType::Destroyed => &self.destroyed,
        };
        set.lock().unwrap().push(Arc::downgrade(core));
    }
}

impl ControllerHandle for LifecycleDispatchQueueController {
    fn unmanage_id(&self, id: Uuid) {
        self.inner.unmanage_id(id);
        remove_member(&self.paused, id);
        remove_member(&self.stopped, id);
        remove_member(&self.destroyed, id);
    }
}

/// Receives lifecycle signals from a [`LifecycleSignalSource`].
pub trait LifecycleSubscriber: Send + Sync {
    /// Called once per real occurrence of a signal, in order.
    fn on_lifecycle_signal(&self, signal: CancelType);
}

impl LifecycleSubscriber for LifecycleDispatchQueueController {
    fn on_lifecycle_signal(&self, signal: CancelType) {
        debug!(?signal, "lifecycle signal received");
        match signal {
            CancelType::Paused => self.cancel_all_paused(),
            CancelType::Stopped => self.cancel_all_stopped(),
            CancelType::Destroyed => self.cancel_all_destroyed(),
        }
    }
}

/// An owner whose lifecycle signals queues can be bound to.
///
/// Host environments implement this by translating their native lifecycle
/// callbacks into [`CancelType`] signals. Implementations must fire each
/// signal exactly once per real occurrence, in order.
pub trait LifecycleSignalSource {
    /// Register a subscriber. Held weakly: a dropped subscriber is pruned
    /// automatically, no explicit unsubscribe needed.
    fn subscribe(&self, subscriber: Weak<dyn LifecycleSubscriber>);
}

/// A concrete signal source for headless hosts and tests.
///
/// Call [`emit`](Self::emit) as the owner moves through its lifecycle.
/// After `Destroyed` the owner is dead: subscribers are released and
/// further signals are ignored.
#[derive(Default)]
pub struct HeadlessLifecycleOwner {
    subscribers: Mutex<Vec<Weak<dyn LifecycleSubscriber>>>,
    destroyed: AtomicBool,
}

impl HeadlessLifecycleOwner {
    /// Create a live owner with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a lifecycle signal at every live subscriber.
    pub fn emit(&self, signal: CancelType) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let subscribers: Vec<_> = {
            let mut list = self.subscribers.lock().unwrap();
            list.retain(|weak| weak.upgrade().is_some());
            list.iter().filter_map(|weak| weak.upgrade()).collect()
        };
        for subscriber in subscribers {
            subscriber.on_lifecycle_signal(signal);
        }
        if signal == CancelType::Destroyed {
            self.destroyed.store(true, Ordering::SeqCst);
            self.subscribers.lock().unwrap().clear();
        }
    }
}

impl LifecycleSignalSource for HeadlessLifecycleOwner {
    fn subscribe(&self, subscriber: Weak<dyn LifecycleSubscriber>) {
        if !self.destroyed.load(Ordering::SeqCst) {
            self.subscribers.lock().unwrap().push(subscriber);
        }
    }
}
