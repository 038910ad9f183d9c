//! Hazard latch.
//!
//! A physical anomaly (leak, stuck valve) latches a marker file that
//! survives restarts and forces the valve CLOSE until an operator clears it
//! after inspection. Notifications are rate-limited to one per 30 minutes;
//! the forced CLOSE is not.

use std::path::PathBuf;

use tracing::warn;

use mist_error::Result;
use mist_protocol::{LogLevel, ValveState};

use crate::constants::HAZARD_NOTIFY_INTERVAL;
use crate::footprint;
use crate::valve::ValveController;
use crate::work_log::WorkLog;

pub struct HazardRegistry {
    file: PathBuf,
    work_log: WorkLog,
}

impl HazardRegistry {
    pub fn new(file: impl Into<PathBuf>, work_log: WorkLog) -> Self {
        Self {
            file: file.into(),
            work_log,
        }
    }

    /// Latch the hazard (creates or refreshes the marker).
    pub fn register(&self) -> Result<()> {
        footprint::update(&self.file)
    }

    /// Clear the latch. Manual operator action only.
    pub fn clear(&self) -> Result<()> {
        warn!("Hazard latch cleared");
        footprint::clear(&self.file)
    }

    pub fn is_latched(&self) -> bool {
        footprint::exists(&self.file)
    }

    /// Report an active hazard: append a work-log ERROR and refresh the
    /// marker at most once per notification window, and always force the
    /// valve CLOSE.
    pub fn notify(&self, valve: &ValveController, message: &str) -> Result<()> {
        let due = !footprint::exists(&self.file)
            || footprint::elapsed(&self.file) > HAZARD_NOTIFY_INTERVAL.as_secs_f64();

        if due {
            self.work_log.add_with_level(message, LogLevel::Error);
            self.register()?;
        }

        valve.set_state(ValveState::Close)?;
        Ok(())
    }

    /// Called at the top of every control step. When latched, reports the
    /// standing hazard (rate-limited) and keeps the valve CLOSE.
    pub fn check(&self, valve: &ValveController) -> Result<bool> {
        if self.is_latched() {
            self.notify(
                valve,
                "Control is suspended: a leak or a broken valve was detected earlier.",
            )?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::MemoryOutput;
    use crate::notify::{MockNotifier, NullEventSink};
    use crate::valve::ValveController;
    use mist_protocol::{ControlMessage, CoolingState, DutyConfig};
    use std::sync::Arc;

    fn fixture() -> (HazardRegistry, ValveController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut notifier = MockNotifier::new();
        notifier.expect_notify_error().return_const(());
        let log = WorkLog::new(Arc::new(notifier), Arc::new(NullEventSink::new()));
        let valve =
            ValveController::new(Arc::new(MemoryOutput::new()), dir.path().join("stat"), log.clone())
                .unwrap();
        let registry = HazardRegistry::new(dir.path().join("hazard"), log);
        (registry, valve, dir)
    }

    #[test]
    fn test_register_latches() {
        let (registry, _valve, _dir) = fixture();
        assert!(!registry.is_latched());
        registry.register().unwrap();
        assert!(registry.is_latched());
        registry.clear().unwrap();
        assert!(!registry.is_latched());
    }

    #[test]
    fn test_notify_forces_close_and_latches() {
        let (registry, valve, _dir) = fixture();
        valve.set_state(ValveState::Open).unwrap();

        registry.notify(&valve, "Water is leaking.").unwrap();

        assert!(registry.is_latched());
        assert_eq!(valve.get_status().unwrap().state, ValveState::Close);
    }

    #[test]
    fn test_latch_forces_close_until_cleared() {
        // Once registered, every apply must drive CLOSE regardless of the
        // requested cooling state, until the operator clears the latch.
        let (registry, valve, _dir) = fixture();
        registry.register().unwrap();

        let working = ControlMessage {
            state: CoolingState::Working,
            duty: DutyConfig {
                enable: true,
                on_sec: 60,
                off_sec: 840,
            },
            mode_index: 1,
            ..ControlMessage::idle()
        };

        for _ in 0..3 {
            let latched = registry.check(&valve).unwrap();
            let msg = if latched { ControlMessage::idle() } else { working.clone() };
            let status = valve.set_cooling_state(&msg).unwrap();
            assert_eq!(status.state, ValveState::Close);
        }

        registry.clear().unwrap();
        assert!(!registry.check(&valve).unwrap());
        let status = valve.set_cooling_state(&working).unwrap();
        assert_eq!(status.state, ValveState::Open);
    }

    #[test]
    fn test_notify_rate_limited_within_window() {
        let (registry, valve, _dir) = fixture();

        registry.notify(&valve, "Water is leaking.").unwrap();
        let log_len = registry.work_log.entries().len();

        // A fresh marker means the second notification stays silent but the
        // valve is still forced CLOSE.
        valve.set_state(ValveState::Open).unwrap();
        registry.notify(&valve, "Water is leaking.").unwrap();

        assert_eq!(registry.work_log.entries().len(), log_len);
        assert_eq!(valve.get_status().unwrap().state, ValveState::Close);
    }
}
