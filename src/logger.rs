//! Logger service and lifecycle
//!
//! One [`Logger`] owns the console slot, the pipeline (formatter, write
//! queue, subscriber hub) and the validated configuration. The lifecycle is:
//!
//! 1. construct (`Logger::new` or the process-wide `Logger::global`)
//! 2. `init` once: validate options, start the write queue, write the session
//!    header, attach
//! 3. log through `console()` handles from any call site
//! 4. `detach` to restore the original console
//! 5. drop the [`LoggerGuard`] (or call `shutdown`) to write out queued lines
//!
//! `attach` is idempotent and the attached state is read from the console
//! slot itself.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{LoggerConfig, LoggerOptions};
use crate::console::{
    current_of, original_of, Console, ConsoleHandle, ConsoleSlot, StdConsole, DEBUG_SIGNATURE,
    EXCEPTION_METHOD,
};
use crate::error::LogError;
use crate::hub::{DisplaySink, Subscriber};
use crate::intercept::{Intercepted, Pipeline};
use crate::level::Level;
use crate::panic::{install_hook, route_unhandled, HandlerSlot, UnhandledHandler, UnhandledReport};
use crate::queue::{ErrorReporter, LogFileSystem, TokioFileSystem, WriteQueue};
use crate::value::LogValue;

static GLOBAL: OnceLock<Logger> = OnceLock::new();

/// Introspection snapshot returned by [`Logger::debug_info`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    /// Console slot currently holds the intercepting wrapper
    pub attached: bool,
    pub initialized: bool,
    /// Target file, when persistence is enabled
    pub path: Option<PathBuf>,
    pub truncate_on_init: bool,
    pub subscribed: bool,
    pub display_bound: bool,
    pub unhandled_captured: bool,
    /// The original console runs in verbose/debug mode
    pub runtime_debug: bool,
    pub original_signature: String,
}

/// Guard that keeps the log file writer alive
///
/// Dropping it drains the write queue and joins the writer thread.
#[must_use = "dropping the guard stops persistence immediately"]
#[derive(Debug)]
pub struct LoggerGuard {
    logger: Logger,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        self.logger.shutdown();
    }
}

struct LoggerInner {
    slot: ConsoleSlot,
    pipeline: Arc<Pipeline>,
    config: OnceLock<LoggerConfig>,
    fs: Arc<dyn LogFileSystem>,
    unhandled: HandlerSlot,
    hook_installed: AtomicBool,
}

/// Process-wide logging service
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("attached", &self.is_attached())
            .field("config", &self.inner.config.get())
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Create a logger around `console`, persisting through `tokio::fs`
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self::with_file_system(console, Arc::new(TokioFileSystem))
    }

    /// Create a logger with a custom file-system capability
    pub fn with_file_system(console: Arc<dyn Console>, fs: Arc<dyn LogFileSystem>) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                slot: Arc::new(RwLock::new(console)),
                pipeline: Arc::new(Pipeline::default()),
                config: OnceLock::new(),
                fs,
                unhandled: Arc::new(RwLock::new(None)),
                hook_installed: AtomicBool::new(false),
            }),
        }
    }

    /// The process-wide logger, wrapping a [`StdConsole`]
    pub fn global() -> &'static Logger {
        GLOBAL.get_or_init(|| Logger::new(Arc::new(StdConsole::from_env())))
    }

    /// Handle for call sites
    pub fn console(&self) -> ConsoleHandle {
        ConsoleHandle::new(Arc::clone(&self.inner.slot))
    }

    /// Validated configuration, once initialized
    pub fn config(&self) -> Option<&LoggerConfig> {
        self.inner.config.get()
    }

    /// One-time initialization
    ///
    /// Invalid options are reported on the original error channel and leave
    /// persistence disabled; the logger is still attached and usable. A
    /// second call is rejected without touching the first configuration.
    pub fn init(&self, options: &LoggerOptions) -> Result<(), LogError> {
        if self.inner.config.get().is_some() {
            return Err(self.report(LogError::AlreadyInitialized));
        }

        let (config, outcome) = match LoggerConfig::from_options(options) {
            Ok(config) => (config, Ok(())),
            Err(e) => (LoggerConfig::disabled(), Err(self.report(e))),
        };
        if self.inner.config.set(config.clone()).is_err() {
            return Err(self.report(LogError::AlreadyInitialized));
        }

        let outcome = match &config.target_path {
            Some(path) => outcome.and(self.start_queue(path.clone(), config.truncate_on_init)),
            None => outcome,
        };
        self.attach();

        info!(
            target: "logtap",
            path = ?config.target_path,
            clear = config.truncate_on_init,
            "logger initialized"
        );
        outcome
    }

    /// Initialize from untyped options; anything but an object is rejected
    pub fn init_json(&self, options: &serde_json::Value) -> Result<(), LogError> {
        match LoggerOptions::from_json(options) {
            Ok(options) => self.init(&options),
            Err(e) => {
                let err = self.report(e);
                // Degrade to persistence disabled
                let _ = self.init(&LoggerOptions::default());
                Err(err)
            }
        }
    }

    fn start_queue(&self, path: PathBuf, truncate: bool) -> Result<(), LogError> {
        let reporter = error_reporter(Arc::downgrade(&self.inner.slot));
        match WriteQueue::spawn(Arc::clone(&self.inner.fs), path.clone(), reporter) {
            Ok(queue) => {
                if truncate {
                    queue.truncate();
                } else {
                    // Blank lines separate this session from earlier content
                    queue.append("");
                    queue.append("");
                }
                let _ = self.inner.pipeline.queue.set(queue);
                Ok(())
            }
            Err(source) => Err(self.report(LogError::Persistence {
                op: "start",
                path,
                source,
            })),
        }
    }

    /// Wrap the current console; no-op when already attached
    ///
    /// Returns `true` if this call attached.
    pub fn attach(&self) -> bool {
        let mut slot = match self.inner.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.has_method(EXCEPTION_METHOD) {
            return false;
        }
        let original = Arc::clone(&*slot);
        *slot = Arc::new(Intercepted::new(original, Arc::clone(&self.inner.pipeline)));
        drop(slot);

        debug!(target: "logtap", "console attached");
        true
    }

    /// Restore the original console
    ///
    /// Returns `true` if a wrapper was removed.
    pub fn detach(&self) -> bool {
        let mut slot = match self.inner.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.original() {
            Some(original) => {
                *slot = original;
                drop(slot);
                debug!(target: "logtap", "console detached");
                true
            }
            None => false,
        }
    }

    /// Whether the console slot currently holds the intercepting wrapper
    pub fn is_attached(&self) -> bool {
        current_of(&self.inner.slot).has_method(EXCEPTION_METHOD)
    }

    /// Register the subscriber, replacing any previous one
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(Level, &str) + Send + Sync + 'static,
    {
        self.inner.pipeline.hub.subscribe(Some(Arc::new(callback)));
    }

    /// Replace or clear (`None`) the subscriber
    pub fn set_subscriber(&self, subscriber: Option<Subscriber>) -> Option<Subscriber> {
        self.inner.pipeline.hub.subscribe(subscriber)
    }

    /// Bind a live display; rejected sinks are reported, never fatal
    pub fn bind_display(&self, sink: Arc<dyn DisplaySink>) -> Result<(), LogError> {
        self.inner
            .pipeline
            .hub
            .bind_display(sink)
            .map_err(|e| self.report(e))
    }

    /// Log panics through this logger
    ///
    /// Without a handler, a panic is logged at the exception level when
    /// attached and at the error level otherwise. Calling again replaces the
    /// handler; the hook itself is installed once.
    pub fn capture_unhandled(&self, handler: Option<UnhandledHandler>) {
        match self.inner.unhandled.write() {
            Ok(mut slot) => *slot = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
        if !self.inner.hook_installed.swap(true, Ordering::SeqCst) {
            install_hook(self.console(), Arc::clone(&self.inner.unhandled));
            debug!(target: "logtap", "panic hook installed");
        }
    }

    /// Route an unhandled failure the way the panic hook does by default
    pub fn report_unhandled(&self, report: &UnhandledReport) {
        route_unhandled(&self.console(), report);
    }

    /// Introspection snapshot
    pub fn debug_info(&self) -> DebugInfo {
        let config = self.inner.config.get();
        let original = original_of(&self.inner.slot);
        let signature = original.signature();
        DebugInfo {
            attached: self.is_attached(),
            initialized: config.is_some(),
            path: config.and_then(|c| c.target_path.clone()),
            truncate_on_init: config.map(|c| c.truncate_on_init).unwrap_or(false),
            subscribed: self.inner.pipeline.hub.has_subscriber(),
            display_bound: self.inner.pipeline.hub.has_display(),
            unhandled_captured: self.inner.hook_installed.load(Ordering::SeqCst),
            runtime_debug: signature == DEBUG_SIGNATURE,
            original_signature: signature,
        }
    }

    /// Wait until every line logged so far has been written
    pub async fn flush(&self) {
        if let Some(queue) = self.inner.pipeline.queue.get() {
            queue.flush().await;
        }
    }

    /// Blocking variant of [`flush`](Self::flush); not for async contexts
    pub fn flush_blocking(&self) {
        if let Some(queue) = self.inner.pipeline.queue.get() {
            queue.flush_blocking();
        }
    }

    /// Write out every queued line and stop the writer thread
    ///
    /// Lines logged afterwards still reach the subscriber and the original
    /// console, but are no longer persisted. Blocks; not for async contexts.
    pub fn shutdown(&self) {
        if let Some(queue) = self.inner.pipeline.queue.get() {
            queue.close();
        }
    }

    /// Guard that runs [`shutdown`](Self::shutdown) when dropped
    ///
    /// Keep it alive for the duration of logging, typically as a local in
    /// `main`. Statics are never dropped, so without it lines still queued
    /// when the process exits are lost.
    pub fn guard(&self) -> LoggerGuard {
        LoggerGuard {
            logger: self.clone(),
        }
    }

    /// Report on the original console's error channel, bypassing the pipeline
    fn report(&self, err: LogError) -> LogError {
        report_on(original_of(&self.inner.slot).as_ref(), &err);
        err
    }
}

fn report_on(console: &dyn Console, err: &LogError) {
    console.call(Level::Error.method(), &[LogValue::Str(err.to_string())]);
}

/// Reporter for the write queue worker
///
/// Holds the slot weakly: the slot owns the pipeline that owns the queue.
fn error_reporter(slot: Weak<RwLock<Arc<dyn Console>>>) -> ErrorReporter {
    Arc::new(move |err: LogError| {
        if let Some(slot) = slot.upgrade() {
            report_on(original_of(&slot).as_ref(), &err);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::RecordingConsole;
    use crate::log_values;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[cfg(not(windows))]
    const GOOD_PATH: &str = "/var/log/app.log";
    #[cfg(windows)]
    const GOOD_PATH: &str = "C:\\logs\\app.log";

    fn recorded() -> (Arc<RecordingConsole>, Logger) {
        let console = Arc::new(RecordingConsole::new());
        let logger = Logger::new(console.clone());
        (console, logger)
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (console, logger) = recorded();
        assert!(!logger.is_attached());

        assert!(logger.attach());
        assert!(!logger.attach());
        assert!(logger.is_attached());

        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        logger.subscribe(move |_, _| *counter.lock().unwrap() += 1);

        logger.console().log(&log_values!["once"]);
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(console.calls().len(), 1);
    }

    #[test]
    fn test_detach_restores_original() {
        let (console, logger) = recorded();
        logger.attach();
        assert!(logger.detach());
        assert!(!logger.is_attached());
        assert!(!logger.detach());

        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        logger.subscribe(move |_, _| *counter.lock().unwrap() += 1);
        logger.console().log(&log_values!["plain"]);

        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(console.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_init_with_clear_writes_single_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.log");
        std::fs::write(&path, "previous session\r\n").unwrap();
        let (_, logger) = recorded();

        logger
            .init(&LoggerOptions::with_path(&path).clear(true))
            .unwrap();
        logger.console().log(&log_values!["hello"]);
        logger.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with(" hello\r\n"), "{:?}", content);
        assert_eq!(content.matches("\r\n").count(), 1);
        assert_eq!(content.len(), "HH:MM:SS hello\r\n".len());
    }

    #[tokio::test]
    async fn test_init_without_clear_appends_separator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.log");
        std::fs::write(&path, "old\r\n").unwrap();
        let (_, logger) = recorded();

        logger.init(&LoggerOptions::with_path(&path)).unwrap();
        logger.console().warn(&log_values!["new"]);
        logger.flush().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("old\r\n\r\n\r\n"));
        assert!(content.ends_with(" WARNING: new\r\n"));
    }

    #[test]
    fn test_repeated_attach_persists_one_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("once.log");
        let (console, logger) = recorded();

        logger
            .init(&LoggerOptions::with_path(&path).clear(true))
            .unwrap();
        assert!(!logger.attach());
        assert!(!logger.attach());
        logger.console().log(&log_values!["single"]);
        logger.flush_blocking();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("\r\n").count(), 1);
        assert!(content.ends_with(" single\r\n"));
        assert_eq!(console.calls_for("log").len(), 1);
    }

    #[test]
    fn test_guard_drains_queue_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guarded.log");
        let (_, logger) = recorded();
        logger
            .init(&LoggerOptions::with_path(&path).clear(true))
            .unwrap();

        {
            let _guard = logger.guard();
            let console = logger.console();
            for i in 0..500 {
                console.log(&log_values!["line", i]);
            }
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("\r\n").count(), 500);
        assert!(content.ends_with(" line 499\r\n"));

        // Still logged, no longer persisted
        logger.console().log(&log_values!["late"]);
        logger.shutdown();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_queue_start_failure_is_returned() {
        struct RefusingFs;

        #[async_trait::async_trait]
        impl LogFileSystem for RefusingFs {
            fn preflight(&self, _path: &std::path::Path) -> std::io::Result<()> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only volume",
                ))
            }

            async fn open(
                &self,
                _path: &std::path::Path,
                _mode: crate::queue::OpenMode,
            ) -> std::io::Result<Box<dyn crate::queue::LogFile>> {
                unreachable!("never opened after a failed start")
            }
        }

        let console = Arc::new(RecordingConsole::new());
        let logger = Logger::with_file_system(console.clone(), Arc::new(RefusingFs));

        let err = logger
            .init(&LoggerOptions::with_path(GOOD_PATH))
            .unwrap_err();
        assert!(matches!(err, LogError::Persistence { op: "start", .. }));
        assert!(logger.is_attached());

        let errors = console.calls_for("error");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text().starts_with("start "));

        logger.console().log(&log_values!["not persisted"]);
        assert_eq!(console.calls_for("log").len(), 1);
    }

    #[test]
    fn test_init_twice_is_rejected() {
        let (console, logger) = recorded();
        logger.init(&LoggerOptions::default()).unwrap();

        let err = logger.init(&LoggerOptions::default()).unwrap_err();
        assert!(matches!(err, LogError::AlreadyInitialized));
        assert_eq!(console.calls_for("error").len(), 1);
    }

    #[test]
    fn test_invalid_path_disables_persistence() {
        let (console, logger) = recorded();

        let err = logger
            .init(&LoggerOptions::with_path("not/a/valid/path"))
            .unwrap_err();
        assert!(matches!(err, LogError::InvalidPath(_)));
        assert!(logger.is_attached());
        assert!(!logger.config().unwrap().persists());

        logger.console().log(&log_values!["still works"]);
        let calls = console.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, "error");
        assert_eq!(calls[1].text(), "still works");
    }

    #[test]
    fn test_init_json_rejects_non_object() {
        let (console, logger) = recorded();
        let err = logger.init_json(&serde_json::json!(42)).unwrap_err();
        assert!(matches!(err, LogError::Config(_)));
        assert!(logger.config().is_some());
        assert!(logger.is_attached());
        assert_eq!(console.calls_for("error").len(), 1);
    }

    #[test]
    fn test_bind_display_rejection_reported() {
        struct Closed;
        impl DisplaySink for Closed {
            fn is_text_container(&self) -> bool {
                false
            }
            fn clear_placeholder(&self) {}
            fn append(&self, _: Level, _: &str) {}
            fn last_line(&self) -> Option<String> {
                None
            }
            fn scroll_to_latest(&self) {}
        }

        let (console, logger) = recorded();
        logger.attach();
        assert!(logger.bind_display(Arc::new(Closed)).is_err());

        // Reported on the original channel only, not through the pipeline
        let errors = console.calls_for("error");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text().starts_with("display sink rejected"));
    }

    #[test]
    fn test_debug_info() {
        let console = Arc::new(RecordingConsole::new().with_signature(DEBUG_SIGNATURE));
        let logger = Logger::new(console);

        let before = logger.debug_info();
        assert!(!before.attached);
        assert!(!before.initialized);
        assert!(before.runtime_debug);

        logger.init(&LoggerOptions::default()).unwrap();
        logger.subscribe(|_, _| {});
        let after = logger.debug_info();
        assert!(after.attached);
        assert!(after.initialized);
        assert!(after.subscribed);
        assert!(after.path.is_none());
        // Still compares the original, not the wrapper
        assert!(after.runtime_debug);
        assert_eq!(after.original_signature, DEBUG_SIGNATURE);
    }

    #[test]
    fn test_report_unhandled_levels() {
        let (console, logger) = recorded();
        let report = UnhandledReport::new("Error", "Error: kaput", "at x.rs:1:1");

        logger.report_unhandled(&report);
        assert_eq!(console.calls_for("error").len(), 1);

        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        logger.subscribe(move |level, line| sink.lock().unwrap().push((level, line.to_string())));
        logger.attach();
        logger.report_unhandled(&report);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Level::Exception);
        assert!(lines[0].1.contains("EXCEPTION: kaput\nat x.rs:1:1"));
    }

    #[test]
    fn test_global_is_shared() {
        let a = Logger::global() as *const Logger;
        let b = Logger::global() as *const Logger;
        assert_eq!(a, b);
    }
}
