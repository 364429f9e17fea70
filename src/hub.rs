//! In-process fan-out of formatted lines
//!
//! One subscriber slot (last writer wins) and one optional display sink.
//! Publishing is synchronous and never lets a failing subscriber reach the
//! logging call site.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::LogError;
use crate::level::Level;

/// Callback receiving every intercepted `(level, line)` pair
pub type Subscriber = Arc<dyn Fn(Level, &str) + Send + Sync>;

/// A live, append-only text surface (for example an on-screen log panel)
pub trait DisplaySink: Send + Sync {
    /// Whether this sink can hold appended text lines
    fn is_text_container(&self) -> bool {
        true
    }

    /// Remove any placeholder content the sink was created with
    fn clear_placeholder(&self);

    /// Append one line tagged with its level
    fn append(&self, level: Level, text: &str);

    /// Text of the newest line
    fn last_line(&self) -> Option<String>;

    /// Bring the newest line into view
    fn scroll_to_latest(&self);
}

/// Subscriber slot plus display binding
#[derive(Default)]
pub struct SubscriberHub {
    subscriber: RwLock<Option<Subscriber>>,
    display: RwLock<Option<Arc<dyn DisplaySink>>>,
}

impl std::fmt::Debug for SubscriberHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHub")
            .field("subscribed", &self.has_subscriber())
            .field("display_bound", &self.has_display())
            .finish()
    }
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subscriber; `None` clears the slot
    ///
    /// Returns the previous subscriber.
    pub fn subscribe(&self, subscriber: Option<Subscriber>) -> Option<Subscriber> {
        match self.subscriber.write() {
            Ok(mut slot) => std::mem::replace(&mut *slot, subscriber),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), subscriber),
        }
    }

    /// Bind a display sink, stripping its placeholder
    ///
    /// A sink that is not a text container is rejected and the previous
    /// binding is kept.
    pub fn bind_display(&self, sink: Arc<dyn DisplaySink>) -> Result<(), LogError> {
        if !sink.is_text_container() {
            return Err(LogError::Display(
                "sink is not an appendable text container".to_string(),
            ));
        }
        sink.clear_placeholder();
        match self.display.write() {
            Ok(mut slot) => *slot = Some(sink),
            Err(poisoned) => *poisoned.into_inner() = Some(sink),
        }
        Ok(())
    }

    /// Check if a subscriber is registered
    pub fn has_subscriber(&self) -> bool {
        self.subscriber.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Check if a display sink is bound
    pub fn has_display(&self) -> bool {
        self.display.read().map(|d| d.is_some()).unwrap_or(false)
    }

    /// Deliver a line to the subscriber and the display sink
    ///
    /// Panics raised by either are caught and dropped here.
    pub fn publish(&self, level: Level, line: &str) {
        let subscriber = self.subscriber.read().ok().and_then(|s| s.clone());
        if let Some(subscriber) = subscriber {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber(level, line)));
            if let Err(payload) = outcome {
                let err = LogError::Subscriber(panic_message(payload.as_ref()));
                debug!(target: "logtap", error = %err, "subscriber dropped a line");
            }
        }

        let display = self.display.read().ok().and_then(|d| d.clone());
        if let Some(display) = display {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                display.append(level, line);
                display.scroll_to_latest();
            }));
            if let Err(payload) = outcome {
                let err = LogError::Display(panic_message(payload.as_ref()));
                debug!(target: "logtap", error = %err, "display sink dropped a line");
            }
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
