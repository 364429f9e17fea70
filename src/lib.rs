//! Logtap - in-process console interception
//!
//! Wraps the ambient console so every call is rendered into a uniform
//! `HH:MM:SS TAG: args` line, appended in order to a log file and handed to a
//! live subscriber, while the original console keeps printing as before.
//!
//! ```no_run
//! use logtap::{log_values, Logger, LoggerOptions};
//!
//! let logger = Logger::global();
//! logger.init(&LoggerOptions::with_path("/var/log/app.log")).ok();
//! // Writes out every queued line when `main` returns
//! let _guard = logger.guard();
//! logger.subscribe(|level, line| eprintln!("[{}] {}", level, line));
//!
//! let console = logger.console();
//! console.warn(&log_values!["disk at", 91, "%"]);
//! ```

pub mod buffer;
pub mod config;
pub mod console;
pub mod error;
pub mod format;
pub mod hub;
mod intercept;
pub mod layer;
pub mod level;
pub mod logger;
pub mod panic;
pub mod queue;
pub mod value;

pub use buffer::{LogBuffer, LogEntry};
pub use config::{LoggerConfig, LoggerOptions};
pub use console::{Console, ConsoleHandle, RecordingConsole, StdConsole};
pub use error::LogError;
pub use format::{Formatter, LogRecord, ObjectRenderer};
pub use hub::{DisplaySink, Subscriber, SubscriberHub};
pub use layer::ConsoleLayer;
pub use level::Level;
pub use logger::{DebugInfo, Logger, LoggerGuard};
pub use panic::{UnhandledHandler, UnhandledReport};
pub use queue::{LogFile, LogFileSystem, OpenMode, TokioFileSystem, WriteQueue};
pub use value::LogValue;
