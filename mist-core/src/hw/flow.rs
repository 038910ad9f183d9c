//! Flow sensor capability.
//!
//! The real device is an industrial flow sensor on a serial bus whose wire
//! protocol lives outside the core; reads can take hundreds of milliseconds
//! while the sensor powers up. The trait models exactly what the monitor
//! needs: a possibly-absent reading, a power state, and a stop control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::info;

use super::DigitalOutput;

/// Flow sensor capability.
#[cfg_attr(test, mockall::automock)]
pub trait FlowSensor: Send + Sync {
    /// Current flow in L/min, or `None` when the sensor did not answer.
    ///
    /// With `force_power_on` the sensor is powered up first if needed; the
    /// monitor passes `false` while the valve is closed so the sensor may
    /// stay asleep.
    fn read(&self, force_power_on: bool) -> Option<f32>;

    /// Whether the sensor is currently powered.
    fn powered(&self) -> bool;

    /// Power the sensor down (energy saving, or a forced restart when it
    /// stops answering).
    fn stop(&self);
}

/// Dummy sensor for tests and offline runs: reports plausible flow whenever
/// the valve output is high.
pub struct DummyFlowSensor {
    valve_output: Arc<dyn DigitalOutput>,
    powered: AtomicBool,
}

impl DummyFlowSensor {
    pub fn new(valve_output: Arc<dyn DigitalOutput>) -> Self {
        Self {
            valve_output,
            powered: AtomicBool::new(true),
        }
    }
}

impl FlowSensor for DummyFlowSensor {
    fn read(&self, force_power_on: bool) -> Option<f32> {
        if force_power_on {
            self.powered.store(true, Ordering::SeqCst);
        }

        let open = self.valve_output.read().ok()?;
        if open {
            Some(1.0 + rand::thread_rng().gen::<f32>() * 1.5)
        } else {
            Some(0.0)
        }
    }

    fn powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        info!("Stop flow sensing");
        self.powered.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::MemoryOutput;

    #[test]
    fn test_dummy_flow_follows_valve() {
        let output = Arc::new(MemoryOutput::new());
        let sensor = DummyFlowSensor::new(output.clone());

        assert_eq!(sensor.read(true), Some(0.0));

        output.write(true).unwrap();
        let flow = sensor.read(true).unwrap();
        assert!((1.0..=2.5).contains(&flow));
    }

    #[test]
    fn test_stop_powers_down_until_forced() {
        let output = Arc::new(MemoryOutput::new());
        let sensor = DummyFlowSensor::new(output);

        assert!(sensor.powered());
        sensor.stop();
        assert!(!sensor.powered());

        sensor.read(false);
        assert!(!sensor.powered());

        sensor.read(true);
        assert!(sensor.powered());
    }
}
