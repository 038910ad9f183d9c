//! Pure decision function: sensor readings + AC power draw → cooling mode.
//!
//! `decide` is deterministic and touches neither the clock nor any I/O. It
//! evaluates two ordered rule lists (first match wins):
//!
//! 1. cooler activity - how hard the indoor AC units are working (0..=6),
//!    from a histogram of per-unit activity classes
//! 2. outdoor adjustment - a signed correction (-10..=+3) from weather
//!
//! The final mode index is `max(cooler + outdoor, 0)` clamped to the profile
//! table.

use tracing::{info, warn};

use mist_protocol::{AirconMode, ControlMessage, DutyConfig, SenseReading, SenseSnapshot, StatusInfo};

use crate::config::Thresholds;
use crate::constants::{COOLING_PROFILES, OFF_SEC_MIN, ON_SEC_MIN, PROFILE_COUNT};

/// Outcome of one decision step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub mode_index: usize,
    pub cooler_status: StatusInfo,
    pub outdoor_status: StatusInfo,
    /// Set when power readings were present but the outdoor temperature was
    /// absent; the caller escalates this through its notifier.
    pub outdoor_temp_unknown: bool,
}

/// Classify one AC unit from its power draw.
///
/// Without the outdoor temperature, heating cannot be told apart from
/// cooling, so classification is impossible. A missing power value degrades
/// that single unit to Off.
fn classify_unit(power: &SenseReading, outdoor_temp: Option<f64>, th: &Thresholds) -> Option<AirconMode> {
    let temp = outdoor_temp?;

    let Some(value) = power.value else {
        warn!(
            "Power draw of {} is unknown, treating the unit as off",
            power.name
        );
        return Some(AirconMode::Off);
    };

    let mode = if temp < th.temp_cooling {
        AirconMode::Off
    } else if value > th.power_full {
        AirconMode::Full
    } else if value > th.power_normal {
        AirconMode::Normal
    } else if value > th.power_work {
        AirconMode::Idle
    } else {
        AirconMode::Off
    };

    info!("{}: {:.0} W, outdoor {:.1} C (mode: {:?})", power.name, value, temp, mode);
    Some(mode)
}

/// Step A: collapse the per-unit histogram to a cooler-activity score.
///
/// Returns `None` when the outdoor temperature is absent while power
/// readings exist (the caller degrades to inactivity and warns).
pub fn cooler_activity(snapshot: &SenseSnapshot, th: &Thresholds) -> Option<StatusInfo> {
    let outdoor_temp = snapshot.outdoor_temp();

    let mut full = 0u32;
    let mut normal = 0u32;
    let mut idle = 0u32;
    for power in &snapshot.power {
        match classify_unit(power, outdoor_temp, th)? {
            AirconMode::Full => full += 1,
            AirconMode::Normal => normal += 1,
            AirconMode::Idle => idle += 1,
            AirconMode::Off => {}
        }
    }

    let status = if full >= 2 {
        StatusInfo::new(6, "Two or more AC units are running at full load. (cooler_status: 6)")
    } else if full >= 1 && normal >= 1 {
        StatusInfo::new(5, "Multiple AC units are running at full or normal load. (cooler_status: 5)")
    } else if full >= 1 {
        StatusInfo::new(4, "One or more AC units are running at full load. (cooler_status: 4)")
    } else if normal >= 2 {
        StatusInfo::new(4, "Two or more AC units are running at normal load. (cooler_status: 4)")
    } else if normal >= 1 {
        StatusInfo::new(3, "One or more AC units are running at normal load. (cooler_status: 3)")
    } else if idle >= 2 {
        StatusInfo::new(2, "Two or more AC units are idling. (cooler_status: 2)")
    } else if idle >= 1 {
        StatusInfo::new(1, "One or more AC units are idling. (cooler_status: 1)")
    } else {
        StatusInfo::new(0, "No AC unit is running. (cooler_status: 0)")
    };

    Some(status)
}

/// Step B: signed outdoor adjustment from the weather readings.
pub fn outdoor_status(snapshot: &SenseSnapshot, th: &Thresholds) -> StatusInfo {
    let temp = SenseSnapshot::first_value(&snapshot.temp);
    let humi = SenseSnapshot::first_value(&snapshot.humi);
    let solar_rad = SenseSnapshot::first_value(&snapshot.solar_rad);
    let lux = SenseSnapshot::first_value(&snapshot.lux);

    let (Some(temp), Some(humi), Some(solar_rad), Some(lux)) = (temp, humi, solar_rad, lux) else {
        return StatusInfo::new(
            -10,
            "Sensor data is missing, stopping cooling. (outdoor_status: -10)",
        );
    };

    // Rain is optional upstream; an absent reading means the gauge had no
    // precipitation sample, not that it is raining.
    let rain = SenseSnapshot::first_value(&snapshot.rain).unwrap_or(0.0);

    if rain > th.rain_max {
        return StatusInfo::new(
            -4,
            format!("It is raining ({rain:.1} mm/h), stopping cooling. (outdoor_status: -4)"),
        );
    }

    if humi > th.humi_max {
        return StatusInfo::new(
            -4,
            format!(
                "Humidity ({humi:.1} %) is above {:.1} %, stopping cooling. (outdoor_status: -4)",
                th.humi_max
            ),
        );
    }

    if temp > th.temp_high_h && solar_rad > th.solar_rad_daytime {
        return StatusInfo::new(
            3,
            format!(
                "Solar radiation ({solar_rad:.0} W/m^2) is above {:.0} W/m^2 and the outdoor \
                 temperature ({temp:.1} C) is above {:.1} C, boosting cooling strongly. \
                 (outdoor_status: 3)",
                th.solar_rad_daytime, th.temp_high_h
            ),
        );
    }

    if temp > th.temp_high_l && solar_rad > th.solar_rad_daytime {
        return StatusInfo::new(
            2,
            format!(
                "Solar radiation ({solar_rad:.0} W/m^2) is above {:.0} W/m^2 and the outdoor \
                 temperature ({temp:.1} C) is above {:.1} C, boosting cooling. (outdoor_status: 2)",
                th.solar_rad_daytime, th.temp_high_l
            ),
        );
    }

    if solar_rad > th.solar_rad_high {
        return StatusInfo::new(
            1,
            format!(
                "Solar radiation ({solar_rad:.0} W/m^2) is above {:.0} W/m^2, boosting cooling \
                 slightly. (outdoor_status: 1)",
                th.solar_rad_high
            ),
        );
    }

    if temp > th.temp_mid && lux < th.lux {
        return StatusInfo::new(
            -1,
            format!(
                "The outdoor temperature ({temp:.1} C) is above {:.1} C but illuminance \
                 ({lux:.0} lx) is below {:.0} lx, easing cooling slightly. (outdoor_status: -1)",
                th.temp_mid, th.lux
            ),
        );
    }

    if lux < th.lux {
        return StatusInfo::new(
            -2,
            format!(
                "Illuminance ({lux:.0} lx) is below {:.0} lx, easing cooling. (outdoor_status: -2)",
                th.lux
            ),
        );
    }

    if solar_rad < th.solar_rad_low {
        return StatusInfo::new(
            -1,
            format!(
                "Solar radiation ({solar_rad:.0} W/m^2) is below {:.0} W/m^2, easing cooling \
                 slightly. (outdoor_status: -1)",
                th.solar_rad_low
            ),
        );
    }

    StatusInfo::silent(0)
}

/// The full decision step. Pure and infallible: a missing outdoor
/// temperature degrades activity to zero and is reported via
/// `outdoor_temp_unknown` instead of an error.
pub fn decide(snapshot: &SenseSnapshot, th: &Thresholds) -> Decision {
    let (cooler_status, outdoor_temp_unknown) = match cooler_activity(snapshot, th) {
        Some(status) => (status, false),
        None => (StatusInfo::silent(0), true),
    };

    let (outdoor, mode) = if cooler_status.status == 0 {
        (StatusInfo::silent(0), 0)
    } else {
        let outdoor = outdoor_status(snapshot, th);
        let mode = (cooler_status.status + outdoor.status).max(0) as usize;
        (outdoor, mode)
    };

    let mode_index = mode.min(PROFILE_COUNT - 1);

    if let Some(message) = &cooler_status.message {
        info!("{message}");
    }
    if let Some(message) = &outdoor.message {
        info!("{message}");
    }
    info!(
        "cooling_mode: {} (cooler_status: {}, outdoor_status: {})",
        mode_index, cooler_status.status, outdoor.status
    );

    Decision {
        mode_index,
        cooler_status,
        outdoor_status: outdoor,
        outdoor_temp_unknown,
    }
}

/// Build the control message for a decision, looking up the profile table.
///
/// In dummy mode the duty durations shrink with the speedup factor, floored
/// at the 5 s minimums so the valve never chatters.
pub fn gen_control_msg(
    decision: &Decision,
    snapshot: SenseSnapshot,
    dummy_mode: bool,
    speedup: u32,
) -> ControlMessage {
    let profile = &COOLING_PROFILES[decision.mode_index.min(PROFILE_COUNT - 1)];

    let duty = if dummy_mode && profile.duty.enable {
        let speedup = speedup.max(1);
        DutyConfig {
            enable: true,
            on_sec: (profile.duty.on_sec / speedup).max(ON_SEC_MIN),
            off_sec: (profile.duty.off_sec / speedup).max(OFF_SEC_MIN),
        }
    } else {
        profile.duty
    };

    ControlMessage {
        state: profile.state,
        duty,
        mode_index: decision.mode_index,
        sense_data: snapshot,
        cooler_status: decision.cooler_status.clone(),
        outdoor_status: decision.outdoor_status.clone(),
    }
}
