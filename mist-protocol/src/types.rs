//! Integer-tagged state enums shared across processes.
//!
//! These serialize as bare integers so the wire stays compatible with the
//! JSON consumed by the dashboard (`"state": 0|1`).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Physical solenoid valve state. OPEN energizes the coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValveState {
    Close,
    Open,
}

impl ValveState {
    pub fn as_u8(self) -> u8 {
        match self {
            ValveState::Close => 0,
            ValveState::Open => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(ValveState::Close),
            1 => Some(ValveState::Open),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValveState::Close => "CLOSE",
            ValveState::Open => "OPEN",
        }
    }
}

impl Serialize for ValveState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ValveState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        ValveState::from_i64(value)
            .ok_or_else(|| D::Error::custom(format!("invalid valve state: {value}")))
    }
}

/// Controller-level cooling intent. Distinct from [`ValveState`] because
/// WORKING alternates OPEN/CLOSE on the duty schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoolingState {
    Idle,
    Working,
}

impl CoolingState {
    pub fn as_u8(self) -> u8 {
        match self {
            CoolingState::Idle => 0,
            CoolingState::Working => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(CoolingState::Idle),
            1 => Some(CoolingState::Working),
            _ => None,
        }
    }
}

impl Serialize for CoolingState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for CoolingState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        CoolingState::from_i64(value)
            .ok_or_else(|| D::Error::custom(format!("invalid cooling state: {value}")))
    }
}

/// Activity classification of a single AC unit, derived from its power draw.
///
/// Off also covers "heating" and "unknown": without a power reading or with
/// the outdoor temperature below the cooling threshold the unit cannot be
/// attributed to cooling load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AirconMode {
    Off,
    Idle,
    Normal,
    Full,
}

impl AirconMode {
    pub const ALL: [AirconMode; 4] = [
        AirconMode::Off,
        AirconMode::Idle,
        AirconMode::Normal,
        AirconMode::Full,
    ];
}

/// Severity of a work-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valve_state_wire_values() {
        assert_eq!(serde_json::to_string(&ValveState::Open).unwrap(), "1");
        assert_eq!(serde_json::to_string(&ValveState::Close).unwrap(), "0");
        assert_eq!(
            serde_json::from_str::<ValveState>("1").unwrap(),
            ValveState::Open
        );
        assert!(serde_json::from_str::<ValveState>("2").is_err());
    }

    #[test]
    fn test_cooling_state_wire_values() {
        assert_eq!(serde_json::to_string(&CoolingState::Working).unwrap(), "1");
        assert_eq!(
            serde_json::from_str::<CoolingState>("0").unwrap(),
            CoolingState::Idle
        );
    }

    #[test]
    fn test_aircon_mode_ordering() {
        assert!(AirconMode::Off < AirconMode::Idle);
        assert!(AirconMode::Idle < AirconMode::Normal);
        assert!(AirconMode::Normal < AirconMode::Full);
    }
}
