//! In-memory display sink for real-time viewing
//!
//! A bounded ring buffer that an on-screen log panel can render from. Binding
//! it to the logger strips the placeholder line it was created with.

use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Local};

use crate::hub::DisplaySink;
use crate::level::Level;

/// Placeholder shown by an empty panel
pub const DEFAULT_PLACEHOLDER: &str = "No log entries yet.";

/// A single displayed line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the line reached the display
    pub received: DateTime<Local>,
    pub level: Level,
    pub text: String,
}

impl LogEntry {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        Self {
            received: Local::now(),
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug)]
struct ViewState {
    placeholder: Option<String>,
    /// Index of the first visible entry
    scroll_offset: usize,
    auto_scroll: bool,
}

/// Thread-safe ring buffer of displayed lines
#[derive(Debug)]
pub struct LogBuffer {
    /// All entries (capped at max_entries)
    entries: RwLock<VecDeque<LogEntry>>,
    /// Warnings, errors and exceptions only
    alerts: RwLock<VecDeque<LogEntry>>,
    view: RwLock<ViewState>,
    max_entries: usize,
    max_alerts: usize,
    /// Visible rows, used to compute the scroll position
    viewport: usize,
}

impl LogBuffer {
    /// Create a buffer with specified capacities
    pub fn new(max_entries: usize, max_alerts: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            alerts: RwLock::new(VecDeque::with_capacity(max_alerts)),
            view: RwLock::new(ViewState {
                placeholder: Some(DEFAULT_PLACEHOLDER.to_string()),
                scroll_offset: 0,
                auto_scroll: true,
            }),
            max_entries,
            max_alerts,
            viewport: 1,
        }
    }

    /// Set the number of visible rows
    pub fn with_viewport(mut self, rows: usize) -> Self {
        self.viewport = rows.max(1);
        self
    }

    /// Push a new entry
    pub fn push(&self, entry: LogEntry) {
        if entry.level.is_alert() {
            if let Ok(mut alerts) = self.alerts.write() {
                if alerts.len() >= self.max_alerts {
                    alerts.pop_front();
                }
                alerts.push_back(entry.clone());
            }
        }

        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.max_entries {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// All entries, oldest first
    pub fn all_entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries inside the viewport at the current scroll position
    pub fn visible_entries(&self) -> Vec<LogEntry> {
        let offset = self.scroll_offset();
        self.entries
            .read()
            .map(|e| e.iter().skip(offset).take(self.viewport).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Placeholder line, if still present
    pub fn placeholder(&self) -> Option<String> {
        self.view.read().ok().and_then(|v| v.placeholder.clone())
    }

    /// First visible entry index
    pub fn scroll_offset(&self) -> usize {
        self.view.read().map(|v| v.scroll_offset).unwrap_or(0)
    }

    /// Stop following new lines and scroll to `offset`
    pub fn scroll_to(&self, offset: usize) {
        let max = self.len().saturating_sub(self.viewport);
        if let Ok(mut view) = self.view.write() {
            view.auto_scroll = false;
            view.scroll_offset = offset.min(max);
        }
    }

    /// Follow new lines again
    pub fn resume_auto_scroll(&self) {
        if let Ok(mut view) = self.view.write() {
            view.auto_scroll = true;
        }
        DisplaySink::scroll_to_latest(self);
    }

    /// Pending alerts (warnings, errors, exceptions)
    pub fn pending_alerts(&self) -> Vec<LogEntry> {
        self.alerts
            .read()
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Clear all alerts (after they've been acknowledged)
    pub fn clear_alerts(&self) {
        if let Ok(mut alerts) = self.alerts.write() {
            alerts.clear();
        }
    }
}

impl DisplaySink for LogBuffer {
    fn clear_placeholder(&self) {
        if let Ok(mut view) = self.view.write() {
            view.placeholder = None;
        }
    }

    fn append(&self, level: Level, text: &str) {
        self.push(LogEntry::new(level, text));
    }

    fn last_line(&self) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|e| e.back().map(|entry| entry.text.clone()))
    }

    fn scroll_to_latest(&self) {
        let latest = self.len().saturating_sub(self.viewport);
        if let Ok(mut view) = self.view.write() {
            if view.auto_scroll {
                view.scroll_offset = latest;
            }
        }
    }
}
