//! Controller and lifecycle cancellation scenarios.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use dispatchq::{
    create_dispatch_queue, create_interval_dispatch_queue, CancelType, DispatchQueueController,
    HeadlessLifecycleOwner, LifecycleDispatchQueueController, QueueError, QueueStatus,
};

const WAIT: Duration = Duration::from_secs(5);

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn ticking_queue(
    controller: &Arc<DispatchQueueController>,
) -> (dispatchq::DispatchQueueHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = create_interval_dispatch_queue(Duration::from_millis(50))
        .do_work(move |_| {
            let _ = tx.send(());
        })
        .managed_by(controller)
        .start()
        .unwrap();
    (handle, rx)
}

#[test]
fn test_cancel_all_dispatch_stops_every_member() {
    let controller = Arc::new(DispatchQueueController::new());
    let (first, first_rx) = ticking_queue(&controller);
    let (second, second_rx) = ticking_queue(&controller);
    first_rx.recv_timeout(WAIT).unwrap();
    second_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(controller.managed_count(), 2);

    controller.cancel_all_dispatch();

    assert!(wait_until(WAIT, || first.status() == QueueStatus::Cancelled));
    assert!(wait_until(WAIT, || second.status() == QueueStatus::Cancelled));
    assert_eq!(controller.managed_count(), 0);
}

#[test]
fn test_cancel_dispatch_targets_only_named_ids() {
    let controller = Arc::new(DispatchQueueController::new());
    let (first, _first_rx) = ticking_queue(&controller);
    let (second, second_rx) = ticking_queue(&controller);

    controller.cancel_dispatch(&[first.id()]);

    assert!(wait_until(WAIT, || first.status() == QueueStatus::Cancelled));
    // The untargeted queue keeps ticking.
    second_rx.recv_timeout(WAIT).unwrap();
    second_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(second.status(), QueueStatus::Running);
    assert!(!controller.is_managing(first.id()));
    assert!(controller.is_managing(second.id()));
    second.cancel();
}

#[test]
fn test_cancelled_member_fails_to_start() {
    let controller = Arc::new(DispatchQueueController::new());
    let queue = create_dispatch_queue()
        .do_work(|_| 1)
        .managed_by(&controller);
    controller.cancel_all_dispatch();
    let result = queue.start();
    assert!(matches!(result, Err(QueueError::Cancelled { .. })));
}

#[test]
fn test_completed_queue_is_unmanaged() {
    let controller = Arc::new(DispatchQueueController::new());
    let (tx, rx) = mpsc::channel();
    let handle = create_dispatch_queue()
        .do_work(move |_| tx.send(()).unwrap())
        .managed_by(&controller)
        .start()
        .unwrap();
    rx.recv_timeout(WAIT).unwrap();
    assert!(wait_until(WAIT, || handle.status() == QueueStatus::Completed));
    assert!(wait_until(WAIT, || controller.managed_count() == 0));
}

#[test]
fn test_lifecycle_pause_cancels_only_paused_members() {
    let owner = HeadlessLifecycleOwner::new();
    let controller = Arc::new(LifecycleDispatchQueueController::new());
    controller.subscribe_to(&owner);

    let (paused_tx, _paused_rx) = mpsc::channel();
    let paused = create_interval_dispatch_queue(Duration::from_millis(50))
        .do_work(move |_| {
            let _ = paused_tx.send(());
        })
        .managed_by_lifecycle(&controller, CancelType::Paused)
        .start()
        .unwrap();
    let (survivor_tx, survivor_rx) = mpsc::channel();
    let survivor = create_interval_dispatch_queue(Duration::from_millis(50))
        .do_work(move |_| {
            let _ = survivor_tx.send(());
        })
        .managed_by_lifecycle(&controller, CancelType::Destroyed)
        .start()
        .unwrap();
    assert_eq!(controller.managed_count(), 2);

    owner.emit(CancelType::Paused);

    assert!(wait_until(WAIT, || paused.status() == QueueStatus::Cancelled));
    survivor_rx.recv_timeout(WAIT).unwrap();
    survivor_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(survivor.status(), QueueStatus::Running);
    assert!(!controller.is_managing(paused.id()));
    assert!(controller.is_managing(survivor.id()));

    owner.emit(CancelType::Destroyed);
    assert!(wait_until(WAIT, || survivor.status() == QueueStatus::Cancelled));
    assert_eq!(controller.managed_count(), 0);
}

#[test]
fn test_lifecycle_destroy_cancels_everything_bound() {
    let owner = HeadlessLifecycleOwner::new();
    let controller = Arc::new(LifecycleDispatchQueueController::new());
    controller.subscribe_to(&owner);

    let handles: Vec<_> = [CancelType::Paused, CancelType::Stopped, CancelType::Destroyed]
        .into_iter()
        .map(|cancel_type| {
            create_interval_dispatch_queue(Duration::from_millis(50))
                .do_work(|_| ())
                .managed_by_lifecycle(&controller, cancel_type)
                .start()
                .unwrap()
        })
        .collect();
    assert_eq!(controller.managed_count(), 3);

    owner.emit(CancelType::Destroyed);

    for handle in &handles {
        assert!(wait_until(WAIT, || handle.status() == QueueStatus::Cancelled));
    }
    assert_eq!(controller.managed_count(), 0);
}

#[test]
fn test_dropped_lifecycle_controller_does_not_break_owner() {
    let owner = HeadlessLifecycleOwner::new();
    {
        let controller = Arc::new(LifecycleDispatchQueueController::new());
        controller.subscribe_to(&owner);
    }
    // The subscription is weak; emitting after the drop must be harmless.
    owner.emit(CancelType::Paused);
    owner.emit(CancelType::Destroyed);
}
