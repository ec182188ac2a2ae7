//! Process-wide library settings
//!
//! Holds the pluggable pieces every dispatch queue consults: the logger,
//! the thread handler factory, the fallback error callback and the
//! leak-warning switch. Settings live behind an explicit `init`/`reset`
//! pair instead of implicit singletons so tests can inject fresh instances.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::DispatchQueueError;
use crate::logger::{Logger, TracingLogger};
use crate::thread::{DefaultThreadHandlerFactory, ThreadHandlerFactory};

/// Callback invoked with step failures. Always called on the MAIN context.
pub type DispatchErrorCallback = Arc<dyn Fn(DispatchQueueError) + Send + Sync>;

/// The dispatch queue library's global settings.
pub struct Settings {
    /// Emit warnings for suspicious usage, such as starting a long-running
    /// queue without a controller. Defaults to `false`.
    pub enable_log_warnings: bool,
    /// Sink for the library's diagnostics. Defaults to [`TracingLogger`].
    pub logger: Arc<dyn Logger>,
    /// Factory for the execution contexts queues run on. Defaults to
    /// [`DefaultThreadHandlerFactory`].
    pub thread_handler_factory: Arc<dyn ThreadHandlerFactory>,
    /// Fallback error callback for queues that did not register their own.
    /// Defaults to `None`, in which case failures go to the logger.
    pub error_callback: Option<DispatchErrorCallback>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_log_warnings: false,
            logger: Arc::new(TracingLogger),
            thread_handler_factory: Arc::new(DefaultThreadHandlerFactory::new()),
            error_callback: None,
        }
    }
}

static SETTINGS: Lazy<RwLock<Settings>> = Lazy::new(|| RwLock::new(Settings::default()));

/// Replace the global settings wholesale. Call at process start, before any
/// queue is created; handlers already created by the previous factory keep
/// running.
pub fn init(settings: Settings) {
    *SETTINGS.write().unwrap() = settings;
}

/// Restore the documented defaults.
pub fn reset() {
    init(Settings::default());
}

/// Enable or disable library usage warnings.
pub fn set_log_warnings(enabled: bool) {
    SETTINGS.write().unwrap().enable_log_warnings = enabled;
}

/// Replace the global logger.
pub fn set_logger(logger: Arc<dyn Logger>) {
    SETTINGS.write().unwrap().logger = logger;
}

/// Replace the thread handler factory used for contexts not yet created.
pub fn set_thread_handler_factory(factory: Arc<dyn ThreadHandlerFactory>) {
    SETTINGS.write().unwrap().thread_handler_factory = factory;
}

/// Set or clear the global fallback error callback.
pub fn set_error_callback(callback: Option<DispatchErrorCallback>) {
    SETTINGS.write().unwrap().error_callback = callback;
}

pub(crate) fn logger() -> Arc<dyn Logger> {
    SETTINGS.read().unwrap().logger.clone()
}

pub(crate) fn thread_handler_factory() -> Arc<dyn ThreadHandlerFactory> {
    SETTINGS.read().unwrap().thread_handler_factory.clone()
}

pub(crate) fn log_warnings_enabled() -> bool {
    SETTINGS.read().unwrap().enable_log_warnings
}

pub(crate) fn global_error_callback() -> Option<DispatchErrorCallback> {
    SETTINGS.read().unwrap().error_callback.clone()
}
