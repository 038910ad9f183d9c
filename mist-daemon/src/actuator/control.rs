//! Control worker: turn the stream of control messages into valve steps.

use std::time::Instant;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use mist_core::constants::RECEIVE_TIMEOUT_INTERVALS;
use mist_core::{footprint, HazardRegistry, ValveController, WorkLog};
use mist_error::Result;
use mist_protocol::{ControlMessage, LogLevel};

use super::{ActuatorContext, MessageQueue};

pub struct ControlWorker {
    queue: MessageQueue,
    valve: Arc<ValveController>,
    hazard: Arc<HazardRegistry>,
    work_log: WorkLog,
    liveness_file: std::path::PathBuf,
    last_message: Arc<Mutex<Option<ControlMessage>>>,
    receive_timeout_sec: f64,
    receive_time: Instant,
    receive_count: u64,
    timeout_reported: bool,
    /// Drain one message per step instead of skipping to the newest, so
    /// test runs consume exactly the commands they were sent
    single_step: bool,
}

impl ControlWorker {
    pub fn new(ctx: &ActuatorContext) -> Self {
        let controller_interval = ctx.settings.effective_interval(ctx.config.controller.interval_sec);
        Self {
            queue: ctx.queue.clone(),
            valve: ctx.valve.clone(),
            hazard: ctx.hazard.clone(),
            work_log: ctx.work_log.clone(),
            liveness_file: ctx.config.actuator.control.liveness.file.clone(),
            last_message: ctx.last_message.clone(),
            receive_timeout_sec: controller_interval * f64::from(RECEIVE_TIMEOUT_INTERVALS),
            receive_time: Instant::now(),
            receive_count: 0,
            timeout_reported: false,
            single_step: std::env::var("TEST").map(|v| v == "true").unwrap_or(false),
        }
    }

    /// Pop the message to act on: the newest queued one, or the last seen
    /// when the queue is empty. Escalates once when no message has arrived
    /// for three controller intervals.
    fn next_message(&mut self) -> Option<ControlMessage> {
        let mut fresh: Option<ControlMessage> = None;
        {
            let mut queue = self.queue.lock();
            while let Some(message) = queue.pop_front() {
                fresh = Some(message);
                if self.single_step {
                    break;
                }
            }
        }

        let last = self.last_message.lock().clone();

        match fresh {
            Some(message) => {
                info!("Receive: {message:?}");
                self.receive_time = Instant::now();
                self.receive_count += 1;
                self.timeout_reported = false;

                let last_index = last.as_ref().map(|m| m.mode_index);
                if last_index != Some(message.mode_index) {
                    self.work_log.add(format!(
                        "Cooling mode changed. ({} -> {})",
                        last_index.map_or_else(|| "init".to_string(), |i| i.to_string()),
                        message.mode_index
                    ));
                }

                *self.last_message.lock() = Some(message.clone());
                Some(message)
            }
            None => {
                let elapsed = self.receive_time.elapsed().as_secs_f64();
                if elapsed > self.receive_timeout_sec && !self.timeout_reported {
                    self.work_log.add_with_level(
                        "No cooling-mode instruction is arriving.",
                        LogLevel::Error,
                    );
                    self.timeout_reported = true;
                }
                last
            }
        }
    }

    /// One control step: hazard check, then the duty-cycle apply.
    pub fn step(&mut self) -> Result<()> {
        let Some(mut message) = self.next_message() else {
            // Nothing received since startup; leave the valve untouched.
            return Ok(());
        };

        if self.hazard.check(&self.valve)? {
            message = ControlMessage::idle();
        }

        self.valve.set_cooling_state(&message)?;
        footprint::update(&self.liveness_file)?;
        Ok(())
    }

    pub fn receive_count(&self) -> u64 {
        self.receive_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{new_message_queue, queue_put, ActuatorContext};
    use crate::shutdown::Shutdown;
    use mist_core::notify::NullEventSink;
    use mist_core::{
        Config, DummyFlowSensor, FlowMonitor, LogNotifier, MemoryOutput, RuntimeSettings,
    };
    use mist_protocol::{CoolingState, DutyConfig, ValveState};

    fn context(dir: &std::path::Path) -> ActuatorContext {
        let config = Config::for_state_dir(dir);
        let notifier = Arc::new(LogNotifier);
        let event_counter = Arc::new(NullEventSink::new());
        let work_log = WorkLog::new(notifier, event_counter.clone());
        let output = Arc::new(MemoryOutput::new());
        let valve = Arc::new(
            ValveController::new(output.clone(), &config.stat_dir, work_log.clone()).unwrap(),
        );
        let hazard = Arc::new(HazardRegistry::new(
            &config.actuator.control.hazard.file,
            work_log.clone(),
        ));
        let monitor = Arc::new(FlowMonitor::new(
            Arc::new(DummyFlowSensor::new(output)),
            valve.clone(),
            hazard.clone(),
            work_log.clone(),
            config.actuator.monitor.clone(),
        ));
        ActuatorContext {
            config,
            settings: RuntimeSettings::default(),
            valve,
            hazard,
            monitor,
            work_log,
            event_counter,
            queue: new_message_queue(),
            last_message: Arc::new(Mutex::new(None)),
        }
    }

    fn working_message(mode_index: usize) -> ControlMessage {
        ControlMessage {
            state: CoolingState::Working,
            duty: DutyConfig {
                enable: true,
                on_sec: 60,
                off_sec: 840,
            },
            mode_index,
            ..ControlMessage::idle()
        }
    }

    #[test]
    fn test_step_applies_newest_message() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut worker = ControlWorker::new(&ctx);
        let liveness = ctx.config.actuator.subscribe.liveness.file.clone();

        queue_put(&ctx.queue, ControlMessage::idle(), &liveness);
        queue_put(&ctx.queue, working_message(3), &liveness);

        worker.step().unwrap();

        // Queue drained to the most recent message; the valve opened.
        assert_eq!(worker.receive_count(), 1);
        assert_eq!(ctx.valve.get_status().unwrap().state, ValveState::Open);
        assert_eq!(ctx.last_message.lock().as_ref().unwrap().mode_index, 3);
        assert!(ctx.work_log.contains("Cooling mode changed"));
    }

    #[test]
    fn test_hazard_overrides_working_message() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut worker = ControlWorker::new(&ctx);
        let liveness = ctx.config.actuator.subscribe.liveness.file.clone();

        ctx.hazard.register().unwrap();
        queue_put(&ctx.queue, working_message(5), &liveness);

        worker.step().unwrap();
        assert_eq!(ctx.valve.get_status().unwrap().state, ValveState::Close);
    }

    #[test]
    fn test_empty_queue_replays_last_message() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut worker = ControlWorker::new(&ctx);
        let liveness = ctx.config.actuator.subscribe.liveness.file.clone();

        queue_put(&ctx.queue, working_message(2), &liveness);
        worker.step().unwrap();
        worker.step().unwrap();

        assert_eq!(worker.receive_count(), 1);
        assert_eq!(ctx.valve.get_status().unwrap().state, ValveState::Open);
    }

    #[test]
    fn test_no_message_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut worker = ControlWorker::new(&ctx);

        let count = ctx.valve.operation_count();
        worker.step().unwrap();
        assert_eq!(ctx.valve.operation_count(), count);
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let liveness = ctx.config.actuator.subscribe.liveness.file.clone();

        for i in 0..mist_core::constants::MESSAGE_QUEUE_BOUND + 3 {
            queue_put(&ctx.queue, working_message(i % 9), &liveness);
        }
        assert_eq!(ctx.queue.lock().len(), mist_core::constants::MESSAGE_QUEUE_BOUND);
        // The newest message is still at the back.
        assert_eq!(
            ctx.queue.lock().back().unwrap().mode_index,
            (mist_core::constants::MESSAGE_QUEUE_BOUND + 2) % 9
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_single_step_in_test_mode() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let liveness = ctx.config.actuator.subscribe.liveness.file.clone();

        std::env::set_var("TEST", "true");
        let mut worker = ControlWorker::new(&ctx);
        std::env::remove_var("TEST");

        queue_put(&ctx.queue, working_message(1), &liveness);
        queue_put(&ctx.queue, working_message(2), &liveness);

        // Test mode consumes exactly one command per step so command
        // counts stay aligned with assertions.
        worker.step().unwrap();
        assert_eq!(worker.receive_count(), 1);
        assert_eq!(ctx.queue.lock().len(), 1);

        worker.step().unwrap();
        assert_eq!(worker.receive_count(), 2);
        assert!(ctx.queue.lock().is_empty());
        assert_eq!(ctx.last_message.lock().as_ref().unwrap().mode_index, 2);
    }

    #[tokio::test]
    async fn test_wait_before_start_honours_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let started = Instant::now();
        super::super::wait_before_start(&ctx.config, &shutdown).await;
        assert!(started.elapsed().as_secs() < 2);
    }
}
