//! Flow monitor: watches flow versus valve state and classifies anomalies.
//!
//! Runs every monitor interval. The monitor never drives the valve itself;
//! physical protection goes through the hazard registry, which forces the
//! CLOSE as part of notification.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use mist_error::Result;
use mist_protocol::{LogLevel, ValveState, ValveStatus};

use crate::config::MonitorConfig;
use crate::constants::{CLOSED_FEED_GRACE_SEC, LEAK_GRACE_STEP_SEC, STUCK_OPEN_GRACE_SEC};
use crate::hazard::HazardRegistry;
use crate::hw::FlowSensor;
use crate::valve::ValveController;
use crate::work_log::WorkLog;

/// One observation: valve status plus the flow reading taken with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MistCondition {
    pub valve: ValveStatus,
    pub flow: Option<f32>,
}

struct MonitorState {
    /// Consecutive ticks with an unknown flow reading
    flow_unknown: u32,
    monitor_count: u64,
    last_flow: Option<f32>,
    last_condition: Option<MistCondition>,
}

pub struct FlowMonitor {
    sensor: Arc<dyn FlowSensor>,
    valve: Arc<ValveController>,
    hazard: Arc<HazardRegistry>,
    work_log: WorkLog,
    config: MonitorConfig,
    /// Log the observation every this many ticks (roughly once a minute)
    log_period: u64,
    state: Mutex<MonitorState>,
}

impl FlowMonitor {
    pub fn new(
        sensor: Arc<dyn FlowSensor>,
        valve: Arc<ValveController>,
        hazard: Arc<HazardRegistry>,
        work_log: WorkLog,
        config: MonitorConfig,
    ) -> Self {
        let log_period = (60 / config.interval_sec.max(1)).max(1) as u64;
        Self {
            sensor,
            valve,
            hazard,
            work_log,
            config,
            log_period,
            state: Mutex::new(MonitorState {
                flow_unknown: 0,
                monitor_count: 0,
                last_flow: Some(0.0),
                last_condition: None,
            }),
        }
    }

    /// Sample valve and flow.
    ///
    /// While OPEN the sensor is read with forced power. While CLOSE it is
    /// read only until flow has actually reached zero, after which it may
    /// stay powered down until the valve opens again. Flow reads can take
    /// long enough that the valve moved meanwhile, so the status is sampled
    /// again afterwards and the later one wins.
    pub fn observe(&self) -> Result<MistCondition> {
        let mut valve_status = self.valve.get_status()?;

        let flow = if valve_status.state == ValveState::Open {
            let flow = self.sensor.read(true);
            valve_status = self.valve.get_status()?;
            flow
        } else {
            let last_flow = self.state.lock().last_flow;
            if last_flow != Some(0.0) {
                self.sensor.read(true)
            } else {
                Some(0.0)
            }
        };

        let condition = MistCondition {
            valve: valve_status,
            flow,
        };

        let mut state = self.state.lock();
        state.last_flow = flow;
        state.last_condition = Some(condition);

        Ok(condition)
    }

    /// One full monitor tick: observe, then classify.
    pub fn tick(&self) -> Result<MistCondition> {
        let condition = self.observe()?;
        self.check(&condition)?;
        Ok(condition)
    }

    /// Classify an observation.
    pub fn check(&self, condition: &MistCondition) -> Result<()> {
        let count = {
            let mut state = self.state.lock();
            state.monitor_count += 1;
            state.monitor_count
        };

        if count % self.log_period == 0 {
            info!(
                "Valve Condition: {} (flow = {})",
                condition.valve.state.name(),
                condition
                    .flow
                    .map_or_else(|| "?".to_string(), |f| format!("{f:.2} L/min")),
            );
        }

        self.check_sensing(condition)?;

        if condition.flow.is_some() {
            self.check_mist_condition(condition)?;
        }

        Ok(())
    }

    /// Track sensor reachability. The counter resets on any reading,
    /// including an honest zero.
    fn check_sensing(&self, condition: &MistCondition) -> Result<()> {
        let flow_unknown = {
            let mut state = self.state.lock();
            if condition.flow.is_none() {
                state.flow_unknown += 1;
            } else {
                state.flow_unknown = 0;
            }
            state.flow_unknown
        };

        let giveup = self.config.sense.giveup;
        if flow_unknown == giveup + 1 {
            self.work_log
                .add_with_level("The flow sensor is not responding.", LogLevel::Error);
        } else if flow_unknown == giveup / 2 + 1 {
            self.work_log.add_with_level(
                "The flow sensor stopped answering, restarting it.",
                LogLevel::Warn,
            );
            self.sensor.stop();
        }

        Ok(())
    }

    fn check_mist_condition(&self, condition: &MistCondition) -> Result<()> {
        debug!("Check mist condition");

        let Some(flow) = condition.flow else {
            return Ok(());
        };
        let flow = f64::from(flow);
        let duration = condition.valve.duration_sec;
        let flow_config = &self.config.flow;

        if condition.valve.state == ValveState::Open {
            for (i, threshold) in flow_config.on.max.iter().enumerate() {
                if flow > *threshold && duration > LEAK_GRACE_STEP_SEC * (i + 1) as f64 {
                    self.hazard.notify(
                        &self.valve,
                        &format!(
                            "Water is leaking: {duration:.1} s after opening the valve the flow \
                             is still {flow:.1} L/min (> {threshold:.1} L/min)."
                        ),
                    )?;
                }
            }

            if flow < flow_config.on.min && duration > CLOSED_FEED_GRACE_SEC {
                // The feed main being shut is an installation problem, not a
                // hazard: the valve itself is behaving.
                self.work_log.add_with_level(
                    format!(
                        "The feed main is closed: {duration:.1} s after opening the valve the \
                         flow is only {flow:.1} L/min."
                    ),
                    LogLevel::Error,
                );
            }
        } else {
            debug!("Valve is close for {duration:.1} sec");
            if duration >= flow_config.power_off_sec && flow == 0.0 {
                if self.sensor.powered() {
                    self.work_log.add(
                        "The valve has been closed for a long time, powering off the flow sensor.",
                    );
                    self.sensor.stop();
                }
            } else if duration > STUCK_OPEN_GRACE_SEC && flow > flow_config.off.max {
                self.hazard.notify(
                    &self.valve,
                    &format!(
                        "The solenoid valve is broken, stopping control: {duration:.1} s after \
                         closing the valve the flow is still {flow:.1} L/min."
                    ),
                )?;
            }
        }

        Ok(())
    }

    /// Most recent observation, for the status publisher and web endpoints.
    pub fn last_condition(&self) -> Option<MistCondition> {
        self.state.lock().last_condition
    }

    pub fn monitor_count(&self) -> u64 {
        self.state.lock().monitor_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hw::{MemoryOutput, MockFlowSensor};
    use crate::notify::{MockNotifier, NullEventSink};
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

    struct Fixture {
        monitor: FlowMonitor,
        valve: Arc<ValveController>,
        hazard: Arc<HazardRegistry>,
        work_log: WorkLog,
        _dir: tempfile::TempDir,
    }

    fn fixture(sensor: MockFlowSensor, mutate: impl FnOnce(&mut MonitorConfig)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut notifier = MockNotifier::new();
        notifier.expect_notify_error().return_const(());
        let work_log = WorkLog::new(Arc::new(notifier), Arc::new(NullEventSink::new()));
        let valve = Arc::new(
            ValveController::new(Arc::new(MemoryOutput::new()), dir.path().join("stat"), work_log.clone())
                .unwrap(),
        );
        let hazard = Arc::new(HazardRegistry::new(dir.path().join("hazard"), work_log.clone()));

        let mut config = Config::for_state_dir(dir.path()).actuator.monitor;
        mutate(&mut config);

        Fixture {
            monitor: FlowMonitor::new(Arc::new(sensor), valve.clone(), hazard.clone(), work_log.clone(), config),
            valve,
            hazard,
            work_log,
            _dir: dir,
        }
    }

    #[test]
    fn test_leak_raises_hazard_and_closes_valve() {
        let mut sensor = MockFlowSensor::new();
        sensor.expect_read().returning(|_| Some(7.0));
        sensor.expect_powered().returning(|| true);
        sensor.expect_stop().return_const(());

        let fx = fixture(sensor, |config| {
            config.flow.on.max = vec![5.0];
        });

        fx.valve.set_state(ValveState::Open).unwrap();
        sleep(Duration::from_millis(50));
        // Leak grace has not elapsed yet: no hazard.
        fx.monitor.tick().unwrap();
        assert!(!fx.hazard.is_latched());

        // Pretend the valve has been open long enough by checking a
        // synthetic observation past the grace period.
        let condition = MistCondition {
            valve: ValveStatus {
                state: ValveState::Open,
                duration_sec: 6.0,
            },
            flow: Some(7.0),
        };
        fx.monitor.check(&condition).unwrap();

        assert!(fx.hazard.is_latched());
        assert!(fx.work_log.contains("leaking"));
        assert_eq!(fx.valve.get_status().unwrap().state, ValveState::Close);
    }

    #[test]
    fn test_closed_feed_logs_error_without_hazard() {
        let mut sensor = MockFlowSensor::new();
        sensor.expect_read().returning(|_| Some(0.05));
        sensor.expect_powered().returning(|| true);

        let fx = fixture(sensor, |_| {});

        let condition = MistCondition {
            valve: ValveStatus {
                state: ValveState::Open,
                duration_sec: 6.0,
            },
            flow: Some(0.05),
        };
        fx.monitor.check(&condition).unwrap();

        assert!(fx.work_log.contains("feed main is closed"));
        assert!(!fx.hazard.is_latched());
    }

    #[test]
    fn test_stuck_open_valve_raises_hazard() {
        let mut sensor = MockFlowSensor::new();
        sensor.expect_read().returning(|_| Some(1.5));
        sensor.expect_powered().returning(|| true);

        let fx = fixture(sensor, |_| {});

        let condition = MistCondition {
            valve: ValveStatus {
                state: ValveState::Close,
                duration_sec: 150.0,
            },
            flow: Some(1.5),
        };
        fx.monitor.check(&condition).unwrap();

        assert!(fx.hazard.is_latched());
        assert!(fx.work_log.contains("broken"));
    }

    #[test]
    fn test_quiet_shutdown_powers_sensor_off() {
        let mut sensor = MockFlowSensor::new();
        sensor.expect_read().returning(|_| Some(0.0));
        sensor.expect_powered().times(1).returning(|| true);
        sensor.expect_stop().times(1).return_const(());

        let fx = fixture(sensor, |_| {});

        let condition = MistCondition {
            valve: ValveStatus {
                state: ValveState::Close,
                duration_sec: 400.0,
            },
            flow: Some(0.0),
        };
        fx.monitor.check(&condition).unwrap();

        assert!(fx.work_log.contains("powering off"));
        assert!(!fx.hazard.is_latched());
    }

    #[test]
    fn test_sensor_outage_warns_then_errors() {
        let mut sensor = MockFlowSensor::new();
        sensor.expect_read().returning(|_| None);
        sensor.expect_powered().returning(|| true);
        // The restart kick fires exactly once, at giveup/2 + 1.
        sensor.expect_stop().times(1).return_const(());

        let fx = fixture(sensor, |config| {
            config.sense.giveup = 4;
        });

        fx.valve.set_state(ValveState::Open).unwrap();

        for _ in 0..2 {
            fx.monitor.tick().unwrap();
        }
        assert!(!fx.work_log.contains("restarting"));

        fx.monitor.tick().unwrap();
        assert!(fx.work_log.contains("restarting"));
        assert!(!fx.work_log.contains("not responding"));

        for _ in 0..2 {
            fx.monitor.tick().unwrap();
        }
        assert!(fx.work_log.contains("not responding"));
    }

    #[test]
    fn test_flow_unknown_resets_on_reading() {
        let mut sensor = MockFlowSensor::new();
        let mut readings = vec![None, None, Some(0.0), None].into_iter();
        sensor.expect_read().returning(move |_| readings.next().flatten());
        sensor.expect_powered().returning(|| true);
        sensor.expect_stop().return_const(());

        let fx = fixture(sensor, |config| {
            config.sense.giveup = 4;
        });
        fx.valve.set_state(ValveState::Open).unwrap();

        for _ in 0..4 {
            fx.monitor.tick().unwrap();
        }
        // Two misses, then a good zero reading resets the counter, so the
        // warn threshold (3) is never reached.
        assert!(!fx.work_log.contains("restarting"));
    }

    #[test]
    fn test_closed_valve_skips_read_once_flow_zero() {
        let mut sensor = MockFlowSensor::new();
        // Only the initial OPEN observation reads the sensor; after the
        // valve closes with zero flow, reads stop.
        sensor.expect_read().times(1).returning(|_| Some(0.0));
        sensor.expect_powered().returning(|| true);

        let fx = fixture(sensor, |_| {});
        fx.valve.set_state(ValveState::Open).unwrap();
        fx.monitor.observe().unwrap();

        fx.valve.set_state(ValveState::Close).unwrap();
        let condition = fx.monitor.observe().unwrap();
        assert_eq!(condition.flow, Some(0.0));
        let condition = fx.monitor.observe().unwrap();
        assert_eq!(condition.flow, Some(0.0));
    }
}
