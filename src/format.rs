//! Line formatting
//!
//! Turns a level and its arguments into one human-readable line:
//! `HH:MM:SS [TAG:] arg arg ...`. Rendering is total: a value that cannot be
//! rendered degrades to a placeholder for that value only.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::level::Level;
use crate::value::{
    bytes_to_string, float_to_string, map_entries_to_json, LogValue, Structured, StructuredBody,
};

/// Width of the separator written for [`Level::Line`]
pub const SEPARATOR_WIDTH: usize = 67;

/// Placeholder for an argument whose rendering failed
pub const UNRENDERABLE: &str = "<unrenderable>";

const TIMESTAMP_FORMAT: &str = "%H:%M:%S";
const DATE_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

/// A formatted console call, never persisted as a struct
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub level: Level,
    pub arguments: &'a [LogValue],
    /// Wall-clock time at format time
    pub timestamp: DateTime<Local>,
    /// Rendered form, without line terminator
    pub line: String,
}

/// Strategy for rendering structured objects
///
/// The default [`PrettyJson`] prints the type name followed by every captured
/// field; swap it with [`Formatter::with_renderer`].
pub trait ObjectRenderer: Send + Sync {
    fn render(&self, object: &Structured) -> String;
}

/// Type name plus pretty-printed JSON of all fields
#[derive(Debug, Default, Clone, Copy)]
pub struct PrettyJson;

impl ObjectRenderer for PrettyJson {
    fn render(&self, object: &Structured) -> String {
        match &object.body {
            StructuredBody::Json(json) => match to_pretty_json(json) {
                Ok(text) => format!("{} {}", object.type_name, text),
                Err(_) => format!("{} {}", object.type_name, UNRENDERABLE),
            },
            // `{:#?}` already starts with the type name
            StructuredBody::Debug(text) => text.clone(),
            StructuredBody::Failed(err) => {
                format!("{} <unrenderable: {}>", object.type_name, err)
            }
        }
    }
}

/// Renders console calls into log lines
pub struct Formatter {
    renderer: Box<dyn ObjectRenderer>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Formatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter").finish_non_exhaustive()
    }
}

impl Formatter {
    /// Create a formatter with the default object renderer
    pub fn new() -> Self {
        Self {
            renderer: Box::new(PrettyJson),
        }
    }

    /// Create a formatter with a custom object renderer
    pub fn with_renderer(renderer: impl ObjectRenderer + 'static) -> Self {
        Self {
            renderer: Box::new(renderer),
        }
    }

    /// Format a call using the current local time
    pub fn format(&self, level: Level, values: &[LogValue]) -> String {
        self.format_at(level, values, Local::now())
    }

    /// Format a call with an explicit timestamp
    pub fn format_at(&self, level: Level, values: &[LogValue], now: DateTime<Local>) -> String {
        if level == Level::Line {
            return separator();
        }

        let mut line = now.format(TIMESTAMP_FORMAT).to_string();
        if let Some(tag) = level.tag() {
            line.push(' ');
            line.push_str(tag);
        }
        for value in values {
            line.push(' ');
            line.push_str(&self.render_value(value));
        }
        line
    }

    /// Format a call into a [`LogRecord`]
    pub fn record<'a>(&self, level: Level, values: &'a [LogValue]) -> LogRecord<'a> {
        let timestamp = Local::now();
        LogRecord {
            level,
            arguments: values,
            timestamp,
            line: self.format_at(level, values, timestamp),
        }
    }

    /// Render a single argument
    pub fn render_value(&self, value: &LogValue) -> String {
        match value {
            LogValue::Null => "null".to_string(),
            LogValue::Bool(b) => b.to_string(),
            LogValue::Int(i) => i.to_string(),
            LogValue::UInt(u) => u.to_string(),
            LogValue::BigInt(i) => i.to_string(),
            LogValue::Float(f) => float_to_string(*f),
            LogValue::Str(s) => s.clone(),
            LogValue::Array(_) => prefixed("Array", &value.to_json()),
            LogValue::Map(entries) => {
                prefixed("Map", &serde_json::Value::Object(map_entries_to_json(entries)))
            }
            LogValue::Date(at) => format!("Date {}", at.format(DATE_FORMAT)),
            LogValue::Bytes(bytes) => bytes_to_string(bytes),
            LogValue::Object(obj) => self.renderer.render(obj),
        }
    }
}

/// Fixed-width dash separator
pub fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

fn prefixed(prefix: &str, json: &serde_json::Value) -> String {
    match to_pretty_json(json) {
        Ok(text) => format!("{} {}", prefix, text),
        Err(_) => format!("{} {}", prefix, UNRENDERABLE),
    }
}

/// Pretty-print JSON with a 3-space indent
pub(crate) fn to_pretty_json(value: &serde_json::Value) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
