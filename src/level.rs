//! Log levels recognised by the interception layer

use serde::{Deserialize, Serialize};

/// Level of a single intercepted console call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Default level, no tag
    Log,
    Warn,
    Error,
    Debug,
    Note,
    /// Unhandled failures (panics) routed through an attached console
    Exception,
    /// Pseudo-level rendering a fixed separator, arguments are ignored
    Line,
}

impl Level {
    /// All levels, in declaration order
    pub const ALL: [Level; 7] = [
        Level::Log,
        Level::Warn,
        Level::Error,
        Level::Debug,
        Level::Note,
        Level::Exception,
        Level::Line,
    ];

    /// Map a console method name onto a level
    ///
    /// Returns `None` for names outside the recognised set; those calls are
    /// forwarded to the original console unchanged.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "log" | "info" => Some(Level::Log),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "debug" | "trace" => Some(Level::Debug),
            "note" => Some(Level::Note),
            "exception" => Some(Level::Exception),
            "line" => Some(Level::Line),
            _ => None,
        }
    }

    /// Canonical method name for this level
    pub fn method(&self) -> &'static str {
        match self {
            Level::Log => "log",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Debug => "debug",
            Level::Note => "note",
            Level::Exception => "exception",
            Level::Line => "line",
        }
    }

    /// Tag written after the timestamp, `None` for untagged levels
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Level::Log | Level::Line => None,
            Level::Warn => Some("WARNING:"),
            Level::Error => Some("ERROR:"),
            Level::Debug => Some("DEBUG:"),
            Level::Note => Some("NOTE:"),
            Level::Exception => Some("EXCEPTION:"),
        }
    }

    /// Check if this level is a warning or worse (for alerts)
    pub fn is_alert(&self) -> bool {
        matches!(self, Level::Warn | Level::Error | Level::Exception)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Log,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}
