//! Capture of unhandled failures (panics)
//!
//! The hook only logs: it chains to the previously installed hook afterwards,
//! so a panic keeps its normal behaviour.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic;
#[allow(deprecated)]
use std::panic::PanicInfo;
use std::sync::{Arc, RwLock};

use crate::console::{ConsoleHandle, EXCEPTION_METHOD};
use crate::hub::panic_message;
use crate::level::Level;
use crate::value::LogValue;

/// Redundant prefix removed from reported messages
const ERROR_PREFIX: &str = "Error: ";

/// Handler replacing the default routing of unhandled failures
pub type UnhandledHandler = Arc<dyn Fn(&UnhandledReport) + Send + Sync>;

/// An unhandled failure, ready to be logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledReport {
    /// What failed, e.g. `thread 'main' panicked`
    pub kind: String,
    pub message: String,
    /// Stack trace, or the panic location when no backtrace was captured
    pub stack: String,
}

impl UnhandledReport {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// Build a report from a panic
    #[allow(deprecated)]
    pub fn from_panic(info: &PanicInfo<'_>) -> Self {
        let thread = std::thread::current();
        let kind = format!("thread '{}' panicked", thread.name().unwrap_or("<unnamed>"));
        let message = panic_message(info.payload());

        let backtrace = Backtrace::capture();
        let stack = if backtrace.status() == BacktraceStatus::Captured {
            backtrace.to_string()
        } else {
            info.location()
                .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default()
        };

        Self::new(kind, message, stack)
    }

    /// Single text block: kind, message and stack
    ///
    /// A leading `Error: ` is dropped from the message, and a kind of plain
    /// `Error` is not repeated.
    pub fn render(&self) -> String {
        let message = strip_error_prefix(&self.message);
        let mut text = if self.kind.is_empty() || self.kind == "Error" {
            message.to_string()
        } else {
            format!("{}: {}", self.kind, message)
        };
        if !self.stack.is_empty() {
            text.push('\n');
            text.push_str(&self.stack);
        }
        text
    }
}

/// Remove a literal `Error: ` prefix
pub fn strip_error_prefix(message: &str) -> &str {
    message.strip_prefix(ERROR_PREFIX).unwrap_or(message)
}

/// Log a report as an exception when attached, as an error otherwise
pub(crate) fn route_unhandled(console: &ConsoleHandle, report: &UnhandledReport) {
    let level = if console.has_method(EXCEPTION_METHOD) {
        Level::Exception
    } else {
        Level::Error
    };
    console.call(level.method(), &[LogValue::Str(report.render())]);
}

/// Replaceable handler shared with the installed hook
pub(crate) type HandlerSlot = Arc<RwLock<Option<UnhandledHandler>>>;

/// Install a process-wide panic hook feeding `console`
///
/// A handler in `handler` takes over routing; it runs inside the panic hook,
/// so it must not panic itself.
pub(crate) fn install_hook(console: ConsoleHandle, handler: HandlerSlot) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let report = UnhandledReport::from_panic(info);
        let custom = handler.read().ok().and_then(|h| h.clone());
        match custom {
            Some(custom) => custom(&report),
            None => route_unhandled(&console, &report),
        }
        previous(info);
    }));
}
