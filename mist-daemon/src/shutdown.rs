//! Coordinated shutdown.
//!
//! One process-wide flag, set by signal handlers or by exhausting a message
//! count. Workers poll it at least once per second: long sleeps are bounded
//! waits on the flag, never raw sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Cloneable one-shot termination event.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early when shutdown triggers. Returns
    /// true if shutdown was triggered.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_triggered() {
                return true;
            }
            let step = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        self.is_triggered()
    }

    /// Install SIGINT/SIGTERM handlers that trigger this event.
    pub fn install_signal_handler(&self) {
        let shutdown = self.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("SIGNAL: received SIGINT/SIGTERM - initiating shutdown");
            shutdown.trigger();
        }) {
            tracing::warn!("Failed to set signal handler: {e}. Shutdown via signals may not work cleanly.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_wakes_on_trigger() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let triggered = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(triggered);
    }

    #[tokio::test]
    async fn test_sleep_completes_without_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.sleep(Duration::from_millis(20)).await);
    }
}
