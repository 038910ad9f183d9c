//! Constants and fixed tables for Mistcool
//!
//! Centralizes all magic numbers, marker paths, and the cooling-profile
//! table. This is the SINGLE SOURCE OF TRUTH for these values - never use
//! magic numbers in other files, add them here first.

use std::time::Duration;

use mist_protocol::{CoolingState, DutyConfig};

/// One row of the cooling-profile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoolingProfile {
    pub state: CoolingState,
    pub duty: DutyConfig,
}

/// Number of cooling profiles (mode index range is `0..PROFILE_COUNT`)
pub const PROFILE_COUNT: usize = 9;

/// Fixed duty period of every working profile (15 minutes)
pub const DUTY_PERIOD_SEC: u32 = 900;

const fn working(on_sec: u32) -> CoolingProfile {
    CoolingProfile {
        state: CoolingState::Working,
        duty: DutyConfig {
            enable: true,
            on_sec,
            off_sec: DUTY_PERIOD_SEC - on_sec,
        },
    }
}

/// The cooling-profile table. Row 0 is IDLE; rows 1-8 spray with a duty
/// cycle whose ON share grows with the mode index. `on_sec + off_sec` is
/// the fixed 15-minute period for every working row.
pub const COOLING_PROFILES: [CoolingProfile; PROFILE_COUNT] = [
    CoolingProfile {
        state: CoolingState::Idle,
        duty: DutyConfig::IDLE,
    },
    working(60),
    working(120),
    working(180),
    working(240),
    working(360),
    working(480),
    working(660),
    working(900),
];

/// Minimum ON duration after speedup scaling (also applies in tests)
pub const ON_SEC_MIN: u32 = 5;
/// Minimum OFF duration after speedup scaling (also applies in tests)
pub const OFF_SEC_MIN: u32 = 5;

/// Hazard re-notification window
pub const HAZARD_NOTIFY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Closed-valve duration after which non-zero flow means a stuck valve
pub const STUCK_OPEN_GRACE_SEC: f64 = 120.0;

/// Per-step grace when climbing the leak threshold ladder
pub const LEAK_GRACE_STEP_SEC: f64 = 5.0;

/// Open-valve duration after which too-low flow means the feed is closed
pub const CLOSED_FEED_GRACE_SEC: f64 = 5.0;

/// Missed-message escalation threshold, in controller intervals
pub const RECEIVE_TIMEOUT_INTERVALS: u32 = 3;

/// Bound on the subscribe → control in-process queue; when full the oldest
/// entry is dropped so the newest decision wins
pub const MESSAGE_QUEUE_BOUND: usize = 10;

/// Bounded wait for each worker future at shutdown
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Marker file layout under the runtime state directory
pub mod paths {
    use std::path::{Path, PathBuf};

    /// Default runtime state directory (tmpfs so markers cost nothing and
    /// vanish on reboot, while surviving process restarts)
    pub const STAT_DIR: &str = "/dev/shm/unit_cooler";

    /// Created while the cooling state is WORKING
    pub fn valve_state_working(base: &Path) -> PathBuf {
        base.join("valve").join("state").join("working")
    }

    /// Created while the cooling state is IDLE
    pub fn valve_state_idle(base: &Path) -> PathBuf {
        base.join("valve").join("state").join("idle")
    }

    /// Touched when the valve actually opens
    pub fn valve_open(base: &Path) -> PathBuf {
        base.join("valve").join("open")
    }

    /// Touched when the valve actually closes
    pub fn valve_close(base: &Path) -> PathBuf {
        base.join("valve").join("close")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_count() {
        assert_eq!(COOLING_PROFILES.len(), 9);
    }

    #[test]
    fn test_first_profile_is_idle() {
        let idle = &COOLING_PROFILES[0];
        assert_eq!(idle.state, CoolingState::Idle);
        assert!(!idle.duty.enable);
        assert_eq!(idle.duty.on_sec, 0);
        assert_eq!(idle.duty.off_sec, 0);
    }

    #[test]
    fn test_working_profiles_have_fixed_period() {
        for profile in &COOLING_PROFILES[1..] {
            assert_eq!(profile.state, CoolingState::Working);
            assert!(profile.duty.enable);
            assert_eq!(profile.duty.on_sec + profile.duty.off_sec, DUTY_PERIOD_SEC);
        }
    }

    #[test]
    fn test_duty_monotonicity() {
        for pair in COOLING_PROFILES[1..].windows(2) {
            assert!(pair[0].duty.on_sec < pair[1].duty.on_sec);
            assert!(pair[0].duty.off_sec > pair[1].duty.off_sec);
        }
    }
}
