//! Message bodies exchanged between controller, actuator and WebUI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CoolingState, ValveState};

/// Duty-cycle configuration of one cooling profile.
///
/// For working profiles `on_sec + off_sec` equals the fixed 15-minute duty
/// period. The idle profile carries `enable=false` with zero durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyConfig {
    pub enable: bool,
    pub on_sec: u32,
    pub off_sec: u32,
}

impl DutyConfig {
    pub const IDLE: DutyConfig = DutyConfig {
        enable: false,
        on_sec: 0,
        off_sec: 0,
    };
}

/// Score plus human-readable rationale, used for both the cooler-activity
/// and outdoor-adjustment results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusInfo {
    pub status: i32,
    pub message: Option<String>,
}

impl StatusInfo {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    pub fn silent(status: i32) -> Self {
        Self {
            status,
            message: None,
        }
    }
}

/// One environmental or power-meter reading. `value` is absent when the
/// database had no fresh sample for the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenseReading {
    pub name: String,
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl SenseReading {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            time: None,
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            time: None,
        }
    }
}

/// Snapshot of every reading the decision engine consumes.
///
/// The first `temp` entry is the outdoor temperature. `power` carries one
/// entry per AC unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SenseSnapshot {
    #[serde(default)]
    pub temp: Vec<SenseReading>,
    #[serde(default)]
    pub humi: Vec<SenseReading>,
    #[serde(default)]
    pub lux: Vec<SenseReading>,
    #[serde(default)]
    pub solar_rad: Vec<SenseReading>,
    #[serde(default)]
    pub rain: Vec<SenseReading>,
    #[serde(default)]
    pub power: Vec<SenseReading>,
}

impl SenseSnapshot {
    /// First value of a reading list, flattening "no entry" and
    /// "entry without value" into one absent case.
    pub fn first_value(readings: &[SenseReading]) -> Option<f64> {
        readings.first().and_then(|r| r.value)
    }

    /// Outdoor temperature (first `temp` entry by convention).
    pub fn outdoor_temp(&self) -> Option<f64> {
        Self::first_value(&self.temp)
    }
}

/// Control message published by the controller each interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub state: CoolingState,
    pub duty: DutyConfig,
    pub mode_index: usize,
    #[serde(default)]
    pub sense_data: SenseSnapshot,
    #[serde(default)]
    pub cooler_status: StatusInfo,
    #[serde(default)]
    pub outdoor_status: StatusInfo,
}

impl ControlMessage {
    /// The message forced while a hazard is latched: idle profile, no duty.
    pub fn idle() -> Self {
        Self {
            state: CoolingState::Idle,
            duty: DutyConfig::IDLE,
            mode_index: 0,
            sense_data: SenseSnapshot::default(),
            cooler_status: StatusInfo::default(),
            outdoor_status: StatusInfo::default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Valve state plus elapsed wall time in that state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValveStatus {
    pub state: ValveState,
    #[serde(rename = "duration")]
    pub duration_sec: f64,
}

impl ValveStatus {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Actuator state published on the secondary status topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorStatus {
    pub timestamp: DateTime<Utc>,
    pub valve: ValveStatus,
    pub flow_lpm: Option<f32>,
    pub cooling_mode_index: usize,
    pub hazard_detected: bool,
}

impl ActuatorStatus {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_snapshot() -> SenseSnapshot {
        SenseSnapshot {
            temp: vec![SenseReading::new("outdoor", 33.0)],
            humi: vec![SenseReading::new("outdoor", 55.0)],
            lux: vec![SenseReading::new("outdoor", 50_000.0)],
            solar_rad: vec![SenseReading::new("outdoor", 600.0)],
            rain: vec![SenseReading::new("outdoor", 0.0)],
            power: vec![
                SenseReading::new("living", 1000.0),
                SenseReading::absent("bedroom"),
            ],
        }
    }

    fn sample_message() -> ControlMessage {
        ControlMessage {
            state: CoolingState::Working,
            duty: DutyConfig {
                enable: true,
                on_sec: 660,
                off_sec: 240,
            },
            mode_index: 7,
            sense_data: sample_snapshot(),
            cooler_status: StatusInfo::new(5, "one full, one normal"),
            outdoor_status: StatusInfo::silent(2),
        }
    }

    #[test]
    fn test_control_message_round_trip() {
        let msg = sample_message();
        let json = msg.to_json().unwrap();
        assert_eq!(ControlMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_control_message_wire_shape() {
        let json = sample_message().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["state"], 1);
        assert_eq!(value["duty"]["on_sec"], 660);
        assert_eq!(value["mode_index"], 7);
        assert_eq!(value["cooler_status"]["status"], 5);
        assert!(value["outdoor_status"]["message"].is_null());
        assert!(value["sense_data"]["power"][1]["value"].is_null());
    }

    #[test]
    fn test_valve_status_duration_field_name() {
        let status = ValveStatus {
            state: ValveState::Open,
            duration_sec: 41.5,
        };
        let json = status.to_json().unwrap();
        assert!(json.contains("\"duration\":41.5"), "{json}");
        assert_eq!(ValveStatus::from_json(&json).unwrap(), status);
    }

    #[test]
    fn test_actuator_status_round_trip() {
        let status = ActuatorStatus {
            timestamp: Utc.with_ymd_and_hms(2024, 8, 1, 12, 30, 0).unwrap(),
            valve: ValveStatus {
                state: ValveState::Close,
                duration_sec: 0.0,
            },
            flow_lpm: None,
            cooling_mode_index: 3,
            hazard_detected: true,
        };
        let json = status.to_json().unwrap();
        assert_eq!(ActuatorStatus::from_json(&json).unwrap(), status);
    }

    #[test]
    fn test_idle_message_is_mode_zero() {
        let msg = ControlMessage::idle();
        assert_eq!(msg.mode_index, 0);
        assert_eq!(msg.state, CoolingState::Idle);
        assert!(!msg.duty.enable);
    }

    #[test]
    fn test_missing_optional_sections_default() {
        let json = r#"{"state":1,"duty":{"enable":true,"on_sec":60,"off_sec":840},"mode_index":1}"#;
        let msg = ControlMessage::from_json(json).unwrap();
        assert!(msg.sense_data.power.is_empty());
        assert_eq!(msg.cooler_status.status, 0);
    }
}
