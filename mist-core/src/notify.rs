//! Notification capabilities.
//!
//! `Notifier` carries operator-facing escalations (Slack in production, log
//! lines otherwise). `EventSink` signals the WebUI that the work log grew.
//! Both are injected; the core never knows the delivery mechanism.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::error;

/// Operator escalation channel.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Default notifier: escalations become ERROR log lines.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) {
        error!("{message}");
    }
}

/// Deduplicating wrapper: the same message is forwarded at most once per
/// window, so a stuck condition does not flood the channel.
pub struct DedupNotifier {
    inner: Arc<dyn Notifier>,
    window: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl DedupNotifier {
    pub fn new(inner: Arc<dyn Notifier>, window: Duration) -> Self {
        Self {
            inner,
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }
}

impl Notifier for DedupNotifier {
    fn notify_error(&self, message: &str) {
        let now = Instant::now();
        let mut last_sent = self.last_sent.lock();

        if let Some(sent) = last_sent.get(message) {
            if now.duration_since(*sent) < self.window {
                return;
            }
        }

        last_sent.retain(|_, sent| now.duration_since(*sent) < self.window);
        last_sent.insert(message.to_string(), now);
        drop(last_sent);

        self.inner.notify_error(message);
    }
}

/// Change signal for log consumers. Monotonic counter: the WebUI polls it to
/// learn that new work-log entries exist.
pub trait EventSink: Send + Sync {
    fn signal(&self);
}

/// Counting sink, also the no-op default.
#[derive(Debug, Default)]
pub struct NullEventSink {
    count: AtomicU64,
}

impl NullEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl EventSink for NullEventSink {
    fn signal(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingNotifier {
        count: AtomicU64,
    }

    impl Notifier for CountingNotifier {
        fn notify_error(&self, _message: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dedup_suppresses_repeats() {
        let inner = Arc::new(CountingNotifier::default());
        let notifier = DedupNotifier::new(inner.clone(), Duration::from_secs(60));

        notifier.notify_error("leak detected");
        notifier.notify_error("leak detected");
        notifier.notify_error("leak detected");
        assert_eq!(inner.count.load(Ordering::SeqCst), 1);

        notifier.notify_error("valve stuck");
        assert_eq!(inner.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dedup_expires_after_window() {
        let inner = Arc::new(CountingNotifier::default());
        let notifier = DedupNotifier::new(inner.clone(), Duration::from_millis(20));

        notifier.notify_error("leak detected");
        std::thread::sleep(Duration::from_millis(30));
        notifier.notify_error("leak detected");
        assert_eq!(inner.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_sink_counts() {
        let sink = NullEventSink::new();
        sink.signal();
        sink.signal();
        assert_eq!(sink.count(), 2);
    }
}
