//! Solenoid valve controller with duty-cycle semantics.
//!
//! Owns the digital output and the four persistent transition markers:
//! WORKING/IDLE record the cooling state edges, OPEN/CLOSE record the
//! physical transitions. Durations are computed from marker mtimes, so a
//! process restart keeps duty timing ("already open for 40 s") intact.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use mist_error::Result;
use mist_protocol::{ControlMessage, CoolingState, DutyConfig, ValveState, ValveStatus};

use crate::constants::paths;
use crate::footprint;
use crate::hw::DigitalOutput;
use crate::work_log::WorkLog;

pub struct ValveController {
    output: Arc<dyn DigitalOutput>,
    work_log: WorkLog,
    state_working: PathBuf,
    state_idle: PathBuf,
    valve_open: PathBuf,
    valve_close: PathBuf,
    lock: Mutex<()>,
    operation_count: AtomicU64,
    /// Transition history, recorded only when TEST=true in the environment.
    ctrl_hist: Mutex<Vec<ValveState>>,
    record_history: bool,
}

impl ValveController {
    /// Initialize the controller: cooling state starts IDLE and the valve
    /// is driven CLOSE.
    pub fn new(
        output: Arc<dyn DigitalOutput>,
        stat_dir: impl Into<PathBuf>,
        work_log: WorkLog,
    ) -> Result<Self> {
        let stat_dir = stat_dir.into();
        let controller = Self {
            output,
            work_log,
            state_working: paths::valve_state_working(&stat_dir),
            state_idle: paths::valve_state_idle(&stat_dir),
            valve_open: paths::valve_open(&stat_dir),
            valve_close: paths::valve_close(&stat_dir),
            lock: Mutex::new(()),
            operation_count: AtomicU64::new(0),
            ctrl_hist: Mutex::new(Vec::new()),
            record_history: std::env::var("TEST").map(|v| v == "true").unwrap_or(false),
        };

        footprint::clear(&controller.state_working)?;
        footprint::update(&controller.state_idle)?;
        controller.set_state(ValveState::Close)?;

        Ok(controller)
    }

    fn read_state(&self) -> Result<ValveState> {
        Ok(if self.output.read()? {
            ValveState::Open
        } else {
            ValveState::Close
        })
    }

    /// Drive the output. Must be called with the lock held.
    fn set_state_locked(&self, target: ValveState) -> Result<()> {
        let current = self.read_state()?;

        if target != current {
            info!("VALVE: {} -> {}", current.name(), target.name());
            self.operation_count.fetch_add(1, Ordering::SeqCst);

            if self.record_history {
                self.ctrl_hist.lock().push(current);
            }
        }

        self.output.write(target == ValveState::Open)?;

        match target {
            ValveState::Open => {
                footprint::clear(&self.valve_close)?;
                if !footprint::exists(&self.valve_open) {
                    footprint::update(&self.valve_open)?;
                }
            }
            ValveState::Close => {
                footprint::clear(&self.valve_open)?;
                if !footprint::exists(&self.valve_close) {
                    footprint::update(&self.valve_close)?;
                }
            }
        }

        Ok(())
    }

    fn status_locked(&self) -> Result<ValveStatus> {
        let state = self.read_state()?;

        let duration_sec = match state {
            ValveState::Open if footprint::exists(&self.valve_open) => {
                footprint::elapsed(&self.valve_open)
            }
            ValveState::Close if footprint::exists(&self.valve_close) => {
                footprint::elapsed(&self.valve_close)
            }
            _ => 0.0,
        };

        Ok(ValveStatus {
            state,
            duration_sec,
        })
    }

    /// Drive the valve to `target` and return the resulting status.
    pub fn set_state(&self, target: ValveState) -> Result<ValveStatus> {
        let _guard = self.lock.lock();
        self.set_state_locked(target)?;
        self.status_locked()
    }

    /// Current electrical state plus elapsed time in that state.
    pub fn get_status(&self) -> Result<ValveStatus> {
        let _guard = self.lock.lock();
        self.status_locked()
    }

    /// One WORKING duty-cycle step.
    pub fn set_cooling_working(&self, duty: DutyConfig) -> Result<ValveStatus> {
        debug!("set_cooling_working: {duty:?}");

        let _guard = self.lock.lock();

        footprint::clear(&self.state_idle)?;

        if !footprint::exists(&self.state_working) {
            footprint::update(&self.state_working)?;
            self.work_log.add("Starting cooling.");
            info!("COOLING: IDLE -> WORKING");
            self.set_state_locked(ValveState::Open)?;
            return self.status_locked();
        }

        if !duty.enable {
            info!("COOLING: WORKING");
            self.set_state_locked(ValveState::Open)?;
            return self.status_locked();
        }

        let status = self.status_locked()?;

        match status.state {
            ValveState::Open => {
                if status.duration_sec >= f64::from(duty.on_sec) {
                    info!("COOLING: WORKING (OFF duty, {} sec left)", duty.off_sec);
                    self.work_log.add("Entering OFF duty, closing the valve.");
                    self.set_state_locked(ValveState::Close)?;
                } else {
                    info!(
                        "COOLING: WORKING (ON duty, {:.0} sec left)",
                        f64::from(duty.on_sec) - status.duration_sec
                    );
                    self.set_state_locked(ValveState::Open)?;
                }
            }
            ValveState::Close => {
                if status.duration_sec >= f64::from(duty.off_sec) {
                    info!("COOLING: WORKING (ON duty, {} sec left)", duty.on_sec);
                    self.work_log.add("Entering ON duty, opening the valve.");
                    self.set_state_locked(ValveState::Open)?;
                } else {
                    info!(
                        "COOLING: WORKING (OFF duty, {:.0} sec left)",
                        f64::from(duty.off_sec) - status.duration_sec
                    );
                    self.set_state_locked(ValveState::Close)?;
                }
            }
        }

        self.status_locked()
    }

    /// Transition to (or remain in) IDLE: valve CLOSE.
    pub fn set_cooling_idle(&self) -> Result<ValveStatus> {
        let _guard = self.lock.lock();

        footprint::clear(&self.state_working)?;

        if !footprint::exists(&self.state_idle) {
            footprint::update(&self.state_idle)?;
            self.work_log.add("Stopped cooling.");
            info!("COOLING: WORKING -> IDLE");
        } else {
            info!("COOLING: IDLE");
        }

        self.set_state_locked(ValveState::Close)?;
        self.status_locked()
    }

    /// Apply one control message: the duty-cycle step for WORKING, CLOSE
    /// for IDLE.
    pub fn set_cooling_state(&self, message: &ControlMessage) -> Result<ValveStatus> {
        match message.state {
            CoolingState::Working => self.set_cooling_working(message.duty),
            CoolingState::Idle => self.set_cooling_idle(),
        }
    }

    /// Cleanup: always leave the valve closed.
    pub fn close(&self) -> Result<()> {
        self.set_state(ValveState::Close)?;
        Ok(())
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Test helper: recorded prior states of every real transition.
    pub fn history(&self) -> Vec<ValveState> {
        self.ctrl_hist.lock().clone()
    }

    /// Test helper: drop all markers and history.
    pub fn clear_stat(&self) -> Result<()> {
        footprint::clear(&self.state_working)?;
        footprint::clear(&self.state_idle)?;
        footprint::clear(&self.valve_open)?;
        footprint::clear(&self.valve_close)?;
        self.ctrl_hist.lock().clear();
        Ok(())
    }
}
