//! The ambient console surface
//!
//! Call sites log through a [`ConsoleHandle`], which dispatches to whatever
//! [`Console`] currently sits in the logger's slot. Attaching swaps the slot's
//! content for an intercepting wrapper; call sites never change.

use std::io::Write;
use std::sync::{Arc, Mutex, RwLock};

use crate::format::Formatter;
use crate::level::Level;
use crate::value::LogValue;

/// Signature reported by a console running in verbose/debug mode
pub const DEBUG_SIGNATURE: &str = "console[verbose]";

/// Method only present on an intercepted console
pub const EXCEPTION_METHOD: &str = "exception";

/// Method names of a plain console
pub const STANDARD_METHODS: &[&str] = &["log", "info", "warn", "error", "debug", "trace"];

/// A logging surface addressed by method name
pub trait Console: Send + Sync {
    /// Invoke `method` with `args`; unknown methods are a no-op
    fn call(&self, method: &str, args: &[LogValue]);

    /// Check whether `method` exists on this console
    fn has_method(&self, method: &str) -> bool;

    /// String form of the console, compared against [`DEBUG_SIGNATURE`]
    fn signature(&self) -> String {
        "console".to_string()
    }

    /// The console this one wraps, if any
    fn original(&self) -> Option<Arc<dyn Console>> {
        None
    }
}

/// Prints calls to stdout / stderr
///
/// Debug and trace output is only printed in verbose mode.
#[derive(Debug, Default)]
pub struct StdConsole {
    verbose: bool,
    formatter: Formatter,
}

impl StdConsole {
    /// Non-verbose console
    pub fn new() -> Self {
        Self::default()
    }

    /// Console printing debug and trace output too
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            formatter: Formatter::new(),
        }
    }

    /// Verbose when `LOGTAP_VERBOSE` is `1` or `true`
    pub fn from_env() -> Self {
        match std::env::var("LOGTAP_VERBOSE").as_deref() {
            Ok("1") | Ok("true") => Self::verbose(),
            _ => Self::new(),
        }
    }

    /// Check if debug output is printed
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn render(&self, args: &[LogValue]) -> String {
        args.iter()
            .map(|v| self.formatter.render_value(v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Console for StdConsole {
    fn call(&self, method: &str, args: &[LogValue]) {
        // Write errors (closed pipe) are ignored, logging must not fail the host
        match method {
            "log" | "info" => {
                let _ = writeln!(std::io::stdout().lock(), "{}", self.render(args));
            }
            "debug" | "trace" if self.verbose => {
                let _ = writeln!(std::io::stdout().lock(), "{}", self.render(args));
            }
            "warn" | "error" => {
                let _ = writeln!(std::io::stderr().lock(), "{}", self.render(args));
            }
            _ => {}
        }
    }

    fn has_method(&self, method: &str) -> bool {
        STANDARD_METHODS.contains(&method)
    }

    fn signature(&self) -> String {
        if self.verbose {
            DEBUG_SIGNATURE.to_string()
        } else {
            "console".to_string()
        }
    }
}

/// A single call seen by a [`RecordingConsole`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleCall {
    pub method: String,
    pub args: Vec<LogValue>,
}

impl ConsoleCall {
    /// Arguments rendered and joined with a space
    pub fn text(&self) -> String {
        let formatter = Formatter::new();
        self.args
            .iter()
            .map(|v| formatter.render_value(v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// In-memory console that records every call
///
/// Intended for tests and for hosts that want to inspect what reached the
/// original console.
#[derive(Debug)]
pub struct RecordingConsole {
    methods: Vec<String>,
    signature: String,
    calls: Mutex<Vec<ConsoleCall>>,
}

impl Default for RecordingConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingConsole {
    /// Recorder exposing the standard console methods
    pub fn new() -> Self {
        Self {
            methods: STANDARD_METHODS.iter().map(|m| m.to_string()).collect(),
            signature: "console".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Override the reported signature
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Add extra method names
    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods.extend(methods.iter().map(|m| m.to_string()));
        self
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<ConsoleCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Recorded calls for one method
    pub fn calls_for(&self, method: &str) -> Vec<ConsoleCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    /// Forget all recorded calls
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl Console for RecordingConsole {
    fn call(&self, method: &str, args: &[LogValue]) {
        if !self.has_method(method) {
            return;
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ConsoleCall {
                method: method.to_string(),
                args: args.to_vec(),
            });
        }
    }

    fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    fn signature(&self) -> String {
        self.signature.clone()
    }
}

/// Shared slot holding the active console
pub(crate) type ConsoleSlot = Arc<RwLock<Arc<dyn Console>>>;

/// Innermost console behind any wrappers in `slot`
pub(crate) fn original_of(slot: &ConsoleSlot) -> Arc<dyn Console> {
    let mut console = current_of(slot);
    while let Some(inner) = console.original() {
        console = inner;
    }
    console
}

pub(crate) fn current_of(slot: &ConsoleSlot) -> Arc<dyn Console> {
    match slot.read() {
        Ok(guard) => Arc::clone(&*guard),
        Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
    }
}

/// Call-site handle to the logger's console
///
/// Cheap to clone; every call goes to the console active at call time.
#[derive(Clone)]
pub struct ConsoleHandle {
    slot: ConsoleSlot,
}

impl std::fmt::Debug for ConsoleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleHandle")
            .field("signature", &self.current().signature())
            .finish()
    }
}

impl ConsoleHandle {
    pub(crate) fn new(slot: ConsoleSlot) -> Self {
        Self { slot }
    }

    /// Console active right now
    pub fn current(&self) -> Arc<dyn Console> {
        current_of(&self.slot)
    }

    /// Invoke any method by name
    pub fn call(&self, method: &str, args: &[LogValue]) {
        // The slot lock is released before dispatching
        let console = self.current();
        console.call(method, args);
    }

    /// Check whether the active console has `method`
    pub fn has_method(&self, method: &str) -> bool {
        self.current().has_method(method)
    }

    pub fn log(&self, args: &[LogValue]) {
        self.call(Level::Log.method(), args);
    }

    pub fn warn(&self, args: &[LogValue]) {
        self.call(Level::Warn.method(), args);
    }

    pub fn error(&self, args: &[LogValue]) {
        self.call(Level::Error.method(), args);
    }

    pub fn debug(&self, args: &[LogValue]) {
        self.call(Level::Debug.method(), args);
    }

    pub fn note(&self, args: &[LogValue]) {
        self.call(Level::Note.method(), args);
    }

    pub fn exception(&self, args: &[LogValue]) {
        self.call(Level::Exception.method(), args);
    }

    /// Write a separator line
    pub fn line(&self) {
        self.call(Level::Line.method(), &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_values;

    #[test]
    fn test_recording_console_records_known_methods() {
        let console = RecordingConsole::new();
        console.call("log", &log_values!["a", 1]);
        console.call("warn", &log_values!["b"]);
        console.call("exception", &log_values!["ignored"]);

        let calls = console.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, "log");
        assert_eq!(calls[0].text(), "a 1");
        assert_eq!(console.calls_for("warn").len(), 1);

        console.clear();
        assert!(console.calls().is_empty());
    }

    #[test]
    fn test_recording_console_methods_and_signature() {
        let console = RecordingConsole::new()
            .with_methods(&["table"])
            .with_signature(DEBUG_SIGNATURE);
        assert!(console.has_method("table"));
        assert!(!console.has_method(EXCEPTION_METHOD));
        assert_eq!(console.signature(), DEBUG_SIGNATURE);
    }

    #[test]
    fn test_std_console_signature() {
        assert_eq!(StdConsole::new().signature(), "console");
        assert_eq!(StdConsole::verbose().signature(), DEBUG_SIGNATURE);
        assert!(StdConsole::verbose().is_verbose());
        assert!(StdConsole::new().has_method("warn"));
        assert!(!StdConsole::new().has_method(EXCEPTION_METHOD));
    }

    #[test]
    fn test_handle_dispatches_to_current_console() {
        let first = Arc::new(RecordingConsole::new());
        let second = Arc::new(RecordingConsole::new());
        let slot: ConsoleSlot = Arc::new(RwLock::new(first.clone() as Arc<dyn Console>));
        let handle = ConsoleHandle::new(Arc::clone(&slot));

        handle.log(&log_values!["one"]);
        *slot.write().unwrap() = second.clone() as Arc<dyn Console>;
        handle.error(&log_values!["two"]);
        handle.line();

        assert_eq!(first.calls().len(), 1);
        assert_eq!(second.calls_for("error").len(), 1);
        // "line" is not a method of the recorder
        assert_eq!(second.calls().len(), 1);
    }

    #[test]
    fn test_original_of_plain_console_is_itself() {
        let console = Arc::new(RecordingConsole::new().with_signature("plain"));
        let slot: ConsoleSlot = Arc::new(RwLock::new(console as Arc<dyn Console>));
        assert_eq!(original_of(&slot).signature(), "plain");
    }
}
