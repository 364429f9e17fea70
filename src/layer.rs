//! Tracing bridge
//!
//! [`ConsoleLayer`] routes `tracing` events into the logger's console, so code
//! instrumented with `tracing` lands in the same file and subscriber as direct
//! console calls. Events emitted by this crate are skipped.

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::console::ConsoleHandle;
use crate::level::Level;
use crate::logger::Logger;
use crate::value::LogValue;

/// Prefix of this crate's own event targets
const INTERNAL_TARGET: &str = "logtap";

/// `tracing_subscriber` layer feeding a [`Logger`]
#[derive(Debug, Clone)]
pub struct ConsoleLayer {
    console: ConsoleHandle,
}

impl ConsoleLayer {
    pub fn new(logger: &Logger) -> Self {
        Self {
            console: logger.console(),
        }
    }
}

impl Logger {
    /// Layer routing `tracing` events through this logger
    pub fn layer(&self) -> ConsoleLayer {
        ConsoleLayer::new(self)
    }
}

/// Collects the message and the remaining fields of an event
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, LogValue)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: LogValue) {
        if field.name() == "message" {
            self.message = Some(match value {
                LogValue::Str(s) => s,
                other => format!("{:?}", other),
            });
        } else {
            self.fields.push((field.name(), value));
        }
    }

    /// Message first, then `key=value` pairs
    fn into_args(self) -> Vec<LogValue> {
        let mut args = Vec::with_capacity(self.fields.len() + 1);
        if let Some(message) = self.message {
            args.push(LogValue::Str(message));
        }
        for (name, value) in self.fields {
            let rendered = match value {
                LogValue::Str(s) => s,
                other => other.to_json().to_string(),
            };
            args.push(LogValue::Str(format!("{}={}", name, rendered)));
        }
        args
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, LogValue::Str(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, LogValue::Str(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, LogValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, LogValue::UInt(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, LogValue::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, LogValue::Bool(value));
    }
}

impl<S> Layer<S> for ConsoleLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET) {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let level = Level::from(*metadata.level());
        self.console.call(level.method(), &collector.into_args());
    }
}
