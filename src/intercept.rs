//! Interception of console calls
//!
//! [`Intercepted`] wraps the original console. Recognised methods run through
//! format, persist and publish (in that order) and are then forwarded to the
//! original with the same arguments; any other method is forwarded unchanged.

use std::cell::Cell;
use std::sync::{Arc, OnceLock};

use crate::console::Console;
use crate::format::Formatter;
use crate::hub::SubscriberHub;
use crate::level::Level;
use crate::queue::WriteQueue;
use crate::value::LogValue;

thread_local! {
    static IN_PIPELINE: Cell<bool> = Cell::new(false);
}

/// Marks the current thread as running the pipeline
///
/// Calls made while the guard is held (from a subscriber, a display sink or
/// the panic hook) skip the pipeline and only reach the original console.
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        IN_PIPELINE.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReentryGuard)
            }
        })
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_PIPELINE.with(|flag| flag.set(false));
    }
}

/// Formatter, write queue and hub shared by every intercepted call
#[derive(Debug, Default)]
pub(crate) struct Pipeline {
    pub(crate) formatter: Formatter,
    /// Set once by `init`; absent means persistence is disabled
    pub(crate) queue: OnceLock<WriteQueue>,
    pub(crate) hub: SubscriberHub,
}

impl Pipeline {
    /// Format, persist, publish
    ///
    /// Returns the rendered line, or `None` when skipped for re-entry.
    pub(crate) fn process(&self, level: Level, args: &[LogValue]) -> Option<String> {
        let _guard = ReentryGuard::enter()?;
        let record = self.formatter.record(level, args);
        if let Some(queue) = self.queue.get() {
            queue.append(record.line.as_str());
        }
        self.hub.publish(level, &record.line);
        Some(record.line)
    }
}

/// Console wrapper installed by `attach`
pub(crate) struct Intercepted {
    original: Arc<dyn Console>,
    pipeline: Arc<Pipeline>,
}

impl Intercepted {
    pub(crate) fn new(original: Arc<dyn Console>, pipeline: Arc<Pipeline>) -> Self {
        Self { original, pipeline }
    }

    /// Original method used to echo a recognised level
    fn forward_method(&self, method: &str, level: Level) -> Option<&'static str> {
        if self.original.has_method(method) {
            return None;
        }
        let fallback = match level {
            Level::Warn => "warn",
            Level::Error | Level::Exception => "error",
            Level::Debug => "debug",
            Level::Log | Level::Note | Level::Line => "log",
        };
        Some(fallback)
    }
}

impl Console for Intercepted {
    fn call(&self, method: &str, args: &[LogValue]) {
        match Level::from_method(method) {
            Some(level) => {
                self.pipeline.process(level, args);
                match self.forward_method(method, level) {
                    None => self.original.call(method, args),
                    Some(fallback) => self.original.call(fallback, args),
                }
            }
            None => self.original.call(method, args),
        }
    }

    fn has_method(&self, method: &str) -> bool {
        Level::from_method(method).is_some() || self.original.has_method(method)
    }

    fn signature(&self) -> String {
        format!("intercepted({})", self.original.signature())
    }

    fn original(&self) -> Option<Arc<dyn Console>> {
        Some(Arc::clone(&self.original))
    }
}
