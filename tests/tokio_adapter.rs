//! Routing queue work onto a host tokio runtime via a custom factory.
//!
//! Swaps the process-global thread handler factory, so this file holds a
//! single test and nothing else shares its process.

use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::runtime::Handle;

use dispatchq::{
    create_dispatch_queue, settings, DefaultThreadHandlerFactory, ThreadHandler,
    ThreadHandlerFactory, ThreadType, TokioThreadHandler,
};

/// Hands the background context to the runtime; everything else keeps the
/// default dedicated threads.
struct RuntimeFactory {
    handle: Handle,
    inner: DefaultThreadHandlerFactory,
}

impl ThreadHandlerFactory for RuntimeFactory {
    fn create(&self, thread_type: ThreadType) -> Arc<dyn ThreadHandler> {
        match thread_type {
            ThreadType::Background => Arc::new(TokioThreadHandler::new(
                "tokioBackground",
                self.handle.clone(),
            )),
            other => self.inner.create(other),
        }
    }

    fn create_named(&self, name: &str) -> Arc<dyn ThreadHandler> {
        self.inner.create_named(name)
    }
}

#[test]
fn test_background_steps_run_inside_the_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();
    settings::set_thread_handler_factory(Arc::new(RuntimeFactory {
        handle: runtime.handle().clone(),
        inner: DefaultThreadHandlerFactory::new(),
    }));

    let (tx, rx) = mpsc::channel();
    create_dispatch_queue()
        .do_work(|_| Handle::try_current().is_ok())
        .do_work_after(Duration::from_millis(50), |inside| (inside, Handle::try_current().is_ok()))
        .post_main(move |flags| tx.send(flags).unwrap())
        .start()
        .unwrap();

    let (first_inside, second_inside) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(first_inside, "immediate step should run on a runtime worker");
    assert!(second_inside, "delayed step should run on a runtime worker");
}
