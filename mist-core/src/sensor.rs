//! Sensor database capability.
//!
//! The production implementation fans out ~10 parallel time-series queries;
//! that client lives outside the core. The trait surfaces the two reads the
//! system needs: the current snapshot for the decision engine and daily
//! watering totals for the WebUI cost estimate.

use rand::Rng;

use mist_error::Result;
use mist_protocol::{SenseReading, SenseSnapshot};

/// Source of environmental and power-meter readings.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send + Sync {
    /// Fetch the latest reading of every configured sensor. Sensors without
    /// a fresh sample come back with an absent value; only a wholesale
    /// database failure is an error.
    fn fetch(&self) -> Result<SenseSnapshot>;

    /// Total sprayed water volume (L) for the day `day_before` days ago.
    fn day_flow_total(&self, day_before: u32) -> Result<f64>;
}

/// Plausible hot-day snapshots for offline runs.
pub struct DummySensorSource;

impl SensorSource for DummySensorSource {
    fn fetch(&self) -> Result<SenseSnapshot> {
        let mut rng = rand::thread_rng();
        Ok(SenseSnapshot {
            temp: vec![SenseReading::new("outdoor", 30.0 + rng.gen::<f64>() * 6.0)],
            humi: vec![SenseReading::new("outdoor", 50.0 + rng.gen::<f64>() * 20.0)],
            lux: vec![SenseReading::new("outdoor", 40_000.0 + rng.gen::<f64>() * 30_000.0)],
            solar_rad: vec![SenseReading::new("outdoor", 450.0 + rng.gen::<f64>() * 300.0)],
            rain: vec![SenseReading::new("outdoor", 0.0)],
            power: vec![
                SenseReading::new("living", 400.0 + rng.gen::<f64>() * 800.0),
                SenseReading::new("bedroom", rng.gen::<f64>() * 600.0),
            ],
        })
    }

    fn day_flow_total(&self, day_before: u32) -> Result<f64> {
        // Stable per-day pseudo totals so the dashboard shows a history.
        Ok(20.0 + f64::from(day_before % 5) * 7.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_snapshot_has_all_kinds() {
        let snapshot = DummySensorSource.fetch().unwrap();
        assert!(snapshot.outdoor_temp().is_some());
        assert_eq!(snapshot.power.len(), 2);
        assert!(snapshot.rain[0].value.is_some());
    }
}
