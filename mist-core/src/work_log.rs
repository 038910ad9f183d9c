//! Work log: the actuator's operational journal.
//!
//! Every noteworthy physical action ("cooling started", "leak detected")
//! lands here. ERROR entries additionally escalate through the notifier,
//! and every append signals the event sink so the dashboard can refresh.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use mist_protocol::LogLevel;

use crate::notify::{EventSink, Notifier};

/// Bound on retained entries; the log is a journal, not an archive.
const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Shared work log. Clone-cheap via `Arc`.
#[derive(Clone)]
pub struct WorkLog {
    inner: Arc<Inner>,
}

struct Inner {
    entries: Mutex<VecDeque<WorkLogEntry>>,
    notifier: Arc<dyn Notifier>,
    event_sink: Arc<dyn EventSink>,
}

impl WorkLog {
    pub fn new(notifier: Arc<dyn Notifier>, event_sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(VecDeque::new()),
                notifier,
                event_sink,
            }),
        }
    }

    /// Append an INFO entry.
    pub fn add(&self, message: impl Into<String>) {
        self.add_with_level(message, LogLevel::Info);
    }

    pub fn add_with_level(&self, message: impl Into<String>, level: LogLevel) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }

        {
            let mut entries = self.inner.entries.lock();
            if entries.len() == LOG_CAPACITY {
                entries.pop_front();
            }
            entries.push_back(WorkLogEntry {
                timestamp: Utc::now(),
                level,
                message: message.clone(),
            });
        }

        if level == LogLevel::Error {
            self.inner.notifier.notify_error(&message);
        }
        self.inner.event_sink.signal();
    }

    /// Snapshot of all retained entries, oldest first.
    pub fn entries(&self) -> Vec<WorkLogEntry> {
        self.inner.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.entries.lock().clear();
        self.inner.event_sink.signal();
    }

    /// True if any retained entry contains `needle`. Test helper.
    pub fn contains(&self, needle: &str) -> bool {
        self.inner
            .entries
            .lock()
            .iter()
            .any(|e| e.message.contains(needle))
    }
}
