//! Pluggable logger and usage-warning behavior.
//!
//! Mutates the process-global logger and warning switch, so this file holds
//! a single test and nothing else shares its process.

use std::error::Error;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use dispatchq::{create_dispatch_queue, settings, Logger};

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl Logger for RecordingLogger {
    fn log(&self, tag: &str, message: &str) {
        self.lines.lock().unwrap().push(format!("{tag}: {message}"));
    }

    fn error(&self, tag: &str, message: &str, cause: &dyn Error) {
        self.lines
            .lock()
            .unwrap()
            .push(format!("{tag}: {message}: {cause}"));
    }
}

#[test]
fn test_unmanaged_queue_warning_and_unhandled_error_reach_the_logger() {
    let logger = Arc::new(RecordingLogger::default());
    settings::set_logger(logger.clone());
    settings::set_log_warnings(true);

    // No controller: starting should emit the leak warning.
    let (tx, rx) = mpsc::channel();
    create_dispatch_queue()
        .do_work(move |_| tx.send(()).unwrap())
        .start()
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(logger
        .lines
        .lock()
        .unwrap()
        .iter()
        .any(|line| line.contains("no controller")));

    // No error callback anywhere: the failure falls through to the logger.
    create_dispatch_queue()
        .do_work(|_| -> u8 { panic!("unreported") })
        .start()
        .unwrap();
    let logged = {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if logger
                .lines
                .lock()
                .unwrap()
                .iter()
                .any(|line| line.contains("unreported"))
            {
                break true;
            }
            if std::time::Instant::now() > deadline {
                break false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    };
    assert!(logged, "unhandled step failure should reach the logger");

    settings::reset();
}
