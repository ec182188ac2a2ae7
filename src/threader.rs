//! Shared thread handler registry
//!
//! The standard contexts (MAIN, BACKGROUND, IO, ...) are created lazily,
//! once per process, by whatever factory the global settings carry at the
//! moment of first use. `New` handlers are never cached; each request gets
//! a fresh thread owned by the queue that asked for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::settings;
use crate::thread::{ThreadHandler, ThreadType};

static SHARED: Lazy<Mutex<HashMap<ThreadType, Arc<dyn ThreadHandler>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Get the shared handler for a context, creating and starting it on first
/// use. `ThreadType::New` always yields a fresh started handler.
pub fn handler_for(thread_type: ThreadType) -> Arc<dyn ThreadHandler> {
    if thread_type == ThreadType::New {
        let handler = settings::thread_handler_factory().create(ThreadType::New);
        handler.start();
        return handler;
    }
    let mut shared = SHARED.lock().unwrap();
    Arc::clone(shared.entry(thread_type).or_insert_with(|| {
        let handler = settings::thread_handler_factory().create(thread_type);
        handler.start();
        handler
    }))
}

/// Create and start a handler backed by a fresh thread with the given name.
/// The caller owns the handler and is responsible for quitting it.
pub fn named_handler(name: &str) -> Arc<dyn ThreadHandler> {
    let handler = settings::thread_handler_factory().create_named(name);
    handler.start();
    handler
}

/// Quit and forget every cached shared handler. Queues still holding one
/// will fail to schedule further steps, so this belongs in test teardown or
/// controlled shutdown only.
pub fn reset_shared_handlers() {
    let drained: Vec<_> = SHARED.lock().unwrap().drain().collect();
    for (_, handler) in drained {
        handler.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_handlers_are_cached() {
        let first = handler_for(ThreadType::Io);
        let second = handler_for(ThreadType::Io);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_active());
    }

    #[test]
    fn test_new_handlers_are_not_cached() {
        let first = handler_for(ThreadType::New);
        let second = handler_for(ThreadType::New);
        assert!(!Arc::ptr_eq(&first, &second));
        first.quit();
        second.quit();
    }

    #[test]
    fn test_named_handler_uses_requested_name() {
        let handler = named_handler("reportWriter");
        assert_eq!(handler.name(), "reportWriter");
        assert!(handler.is_active());
        handler.quit();
    }
}
