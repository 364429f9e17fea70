//! Heterogeneous argument values passed to console calls
//!
//! Every argument is captured as a [`LogValue`] at the call site. The variant is
//! the type tag the formatter dispatches on; arbitrary structured values are
//! captured eagerly through serde (or `Debug`) so rendering never has to inspect
//! the original object again.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Write};
use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Upper bound on captured `Debug` output
///
/// Self-referencing values (an `Rc` cycle, for example) print forever; the
/// capture is abandoned once this many bytes have been produced.
pub const MAX_DEBUG_BYTES: usize = 64 * 1024;

/// Largest integer a JSON consumer can represent exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: i128 = 9_007_199_254_740_991;

/// A single argument of a console call
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// 128-bit integers, always rendered in decimal
    BigInt(i128),
    Float(f64),
    Str(String),
    Array(Vec<LogValue>),
    /// Key/value container, entry order preserved
    Map(Vec<(LogValue, LogValue)>),
    Date(DateTime<Local>),
    Bytes(Vec<u8>),
    Object(Structured),
}

/// A structured value captured through a reflective serializer
#[derive(Debug, Clone, PartialEq)]
pub struct Structured {
    /// Short type name (module path and generics stripped)
    pub type_name: String,
    pub body: StructuredBody,
}

/// Captured representation of a structured value
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredBody {
    /// All serialized fields
    Json(serde_json::Value),
    /// Pretty `Debug` output, includes private fields
    Debug(String),
    /// Serialization failed, message kept for the placeholder
    Failed(String),
}

impl LogValue {
    /// Capture any serializable value as a structured object
    pub fn object<T: Serialize + ?Sized>(value: &T) -> Self {
        let body = match serde_json::to_value(value) {
            Ok(json) => StructuredBody::Json(json),
            Err(e) => StructuredBody::Failed(e.to_string()),
        };
        LogValue::Object(Structured {
            type_name: short_type_name::<T>(),
            body,
        })
    }

    /// Capture a value through its `Debug` implementation
    ///
    /// Useful for types without `Serialize`; `{:#?}` prints private fields too.
    pub fn debug<T: Debug + ?Sized>(value: &T) -> Self {
        let mut out = CappedWriter::new(MAX_DEBUG_BYTES);
        let body = match write!(out, "{:#?}", value) {
            Ok(()) => StructuredBody::Debug(out.buf),
            Err(_) if out.overflowed => StructuredBody::Failed("too deep".to_string()),
            Err(_) => StructuredBody::Failed("Debug implementation failed".to_string()),
        };
        LogValue::Object(Structured {
            type_name: short_type_name::<T>(),
            body,
        })
    }

    /// Raw byte buffer
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        LogValue::Bytes(bytes.into())
    }

    /// Wall-clock timestamp
    pub fn date(at: DateTime<Local>) -> Self {
        LogValue::Date(at)
    }

    /// Check for the `Null` variant
    pub fn is_null(&self) -> bool {
        matches!(self, LogValue::Null)
    }

    /// JSON form used when this value is nested inside an array, map or object
    ///
    /// Integers outside the safe JSON range become decimal strings so no
    /// precision is lost.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            LogValue::Null => Value::Null,
            LogValue::Bool(b) => Value::Bool(*b),
            LogValue::Int(i) => safe_integer(*i as i128),
            LogValue::UInt(u) => safe_integer(*u as i128),
            LogValue::BigInt(i) => safe_integer(*i),
            LogValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(float_to_string(*f))),
            LogValue::Str(s) => Value::String(s.clone()),
            LogValue::Array(items) => Value::Array(items.iter().map(LogValue::to_json).collect()),
            LogValue::Map(entries) => Value::Object(map_entries_to_json(entries)),
            LogValue::Date(at) => Value::String(at.to_rfc3339()),
            LogValue::Bytes(bytes) => Value::String(bytes_to_string(bytes)),
            LogValue::Object(obj) => match &obj.body {
                StructuredBody::Json(json) => json.clone(),
                StructuredBody::Debug(text) => Value::String(text.clone()),
                StructuredBody::Failed(err) => {
                    Value::String(format!("<unrenderable {}: {}>", obj.type_name, err))
                }
            },
        }
    }

    /// Plain string form used for map keys
    pub(crate) fn key_string(&self) -> String {
        match self {
            LogValue::Str(s) => s.clone(),
            LogValue::Null => "null".to_string(),
            other => match other.to_json() {
                serde_json::Value::String(s) => s,
                json => json.to_string(),
            },
        }
    }
}

/// Convert map entries to a JSON object; later duplicate keys win
pub(crate) fn map_entries_to_json(
    entries: &[(LogValue, LogValue)],
) -> serde_json::Map<String, serde_json::Value> {
    entries
        .iter()
        .map(|(k, v)| (k.key_string(), v.to_json()))
        .collect()
}

/// `ArrayBuffer[<len>] <hex bytes>` rendering of a byte buffer
pub(crate) fn bytes_to_string(bytes: &[u8]) -> String {
    let mut out = format!("ArrayBuffer[{}]", bytes.len());
    for b in bytes {
        out.push_str(&format!(" {:02x}", b));
    }
    out
}

/// Decimal form of a float; infinities spelled `Infinity` / `-Infinity`
pub(crate) fn float_to_string(f: f64) -> String {
    if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// `fmt::Write` sink that fails once `limit` bytes would be exceeded
struct CappedWriter {
    buf: String,
    limit: usize,
    overflowed: bool,
}

impl CappedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            overflowed: false,
        }
    }
}

impl Write for CappedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.buf.len() + s.len() > self.limit {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.buf.push_str(s);
        Ok(())
    }
}

fn safe_integer(value: i128) -> serde_json::Value {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        // Fits in i64 by construction
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Value::String(value.to_string())
    }
}

/// `alloc::vec::Vec<my::Thing>` -> `Vec`
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let base = base.trim_start_matches('&');
    base.rsplit("::").next().unwrap_or(base).to_string()
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty: $($t:ty),*) => {
        $(
            impl From<$t> for LogValue {
                fn from(value: $t) -> Self {
                    LogValue::$variant(value as $target)
                }
            }
        )*
    };
}

impl_from_int!(Int, i64: i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64: u8, u16, u32, u64, usize);

impl From<i128> for LogValue {
    fn from(value: i128) -> Self {
        LogValue::BigInt(value)
    }
}

impl From<u128> for LogValue {
    fn from(value: u128) -> Self {
        match i128::try_from(value) {
            Ok(v) => LogValue::BigInt(v),
            Err(_) => LogValue::Str(value.to_string()),
        }
    }
}

impl From<f32> for LogValue {
    fn from(value: f32) -> Self {
        LogValue::Float(value as f64)
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        LogValue::Float(value)
    }
}

impl From<bool> for LogValue {
    fn from(value: bool) -> Self {
        LogValue::Bool(value)
    }
}

impl From<char> for LogValue {
    fn from(value: char) -> Self {
        LogValue::Str(value.to_string())
    }
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        LogValue::Str(value.to_string())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        LogValue::Str(value)
    }
}

impl From<&String> for LogValue {
    fn from(value: &String) -> Self {
        LogValue::Str(value.clone())
    }
}

impl From<()> for LogValue {
    fn from(_: ()) -> Self {
        LogValue::Null
    }
}

impl<T: Into<LogValue>> From<Option<T>> for LogValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(LogValue::Null)
    }
}

impl<T: Into<LogValue>> From<Vec<T>> for LogValue {
    fn from(value: Vec<T>) -> Self {
        LogValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Clone + Into<LogValue>> From<&[T]> for LogValue {
    fn from(value: &[T]) -> Self {
        LogValue::Array(value.iter().cloned().map(Into::into).collect())
    }
}

impl<K: Into<LogValue>, V: Into<LogValue>> From<BTreeMap<K, V>> for LogValue {
    fn from(value: BTreeMap<K, V>) -> Self {
        LogValue::Map(value.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<LogValue>, V: Into<LogValue>, S> From<HashMap<K, V, S>> for LogValue {
    fn from(value: HashMap<K, V, S>) -> Self {
        LogValue::Map(value.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<DateTime<Local>> for LogValue {
    fn from(value: DateTime<Local>) -> Self {
        LogValue::Date(value)
    }
}

impl From<DateTime<Utc>> for LogValue {
    fn from(value: DateTime<Utc>) -> Self {
        LogValue::Date(value.with_timezone(&Local))
    }
}

impl From<SystemTime> for LogValue {
    fn from(value: SystemTime) -> Self {
        LogValue::Date(DateTime::<Local>::from(value))
    }
}

impl From<serde_json::Value> for LogValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => LogValue::Null,
            Value::Bool(b) => LogValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    LogValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    LogValue::UInt(u)
                } else {
                    LogValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => LogValue::Str(s),
            Value::Array(items) => LogValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => LogValue::Map(
                map.into_iter()
                    .map(|(k, v)| (LogValue::Str(k), v.into()))
                    .collect(),
            ),
        }
    }
}

/// Build a `Vec<LogValue>` from heterogeneous arguments
///
/// ```
/// let args = logtap::log_values!["answer", 42, true];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! log_values {
    () => { ::std::vec::Vec::<$crate::LogValue>::new() };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::LogValue::from($arg)),+]
    };
}
