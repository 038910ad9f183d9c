//! Configuration tree and runtime settings.
//!
//! The JSON config file mirrors the process split: `controller`, `actuator`
//! and `webui` sections plus the shared state directory. `Config::load`
//! validates once at startup; a bad config is the only fatal error class.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mist_error::{CoolerError, Result};

/// The 13 decision constants. Frozen after load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub lux: f64,
    pub solar_rad_low: f64,
    pub solar_rad_high: f64,
    pub solar_rad_daytime: f64,
    pub humi_max: f64,
    pub temp_high_h: f64,
    pub temp_high_l: f64,
    pub temp_mid: f64,
    pub temp_cooling: f64,
    pub rain_max: f64,
    pub power_work: f64,
    pub power_normal: f64,
    pub power_full: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            lux: 500.0,
            solar_rad_low: 100.0,
            solar_rad_high: 500.0,
            solar_rad_daytime: 400.0,
            humi_max: 90.0,
            temp_high_h: 35.0,
            temp_high_l: 32.0,
            temp_mid: 25.0,
            temp_cooling: 20.0,
            rain_max: 0.1,
            power_work: 20.0,
            power_normal: 500.0,
            power_full: 900.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WateringConfig {
    /// Water price per cubic meter, used by the WebUI cost estimate
    pub unit_price: f64,
}

impl Default for WateringConfig {
    fn default() -> Self {
        Self { unit_price: 200.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Publish interval of the control message
    pub interval_sec: u32,
    #[serde(default)]
    pub thresholds: Thresholds,
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub watering: WateringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValveConfig {
    /// BCM pin number of the solenoid driver
    pub pin_no: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardConfig {
    /// Marker file whose presence latches the hazard
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub interval_sec: u32,
    pub valve: ValveConfig,
    pub hazard: HazardConfig,
    pub liveness: LivenessConfig,
}

/// Flow thresholds while the valve is OPEN. `max` is a ladder: entry `i`
/// raises a leak hazard once flow exceeds it for more than `5*(i+1)` s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowOnConfig {
    pub max: Vec<f64>,
    pub min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowOffConfig {
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub on: FlowOnConfig,
    pub off: FlowOffConfig,
    /// Closed-valve duration after which the sensor is powered down
    pub power_off_sec: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            on: FlowOnConfig {
                max: vec![2.0, 3.5],
                min: 0.2,
            },
            off: FlowOffConfig { max: 0.01 },
            power_off_sec: 300.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenseConfig {
    /// Consecutive unknown-flow ticks before giving up on the sensor
    pub giveup: u32,
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self { giveup: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub interval_sec: u32,
    #[serde(default)]
    pub sense: SenseConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    pub liveness: LivenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeConfig {
    pub liveness: LivenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub control: ControlConfig,
    pub monitor: MonitorConfig,
    pub subscribe: SubscribeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebuiConfig {
    pub port: u16,
    pub subscribe: SubscribeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,
    pub actuator: ActuatorConfig,
    pub webui: WebuiConfig,
    /// Runtime state directory for valve transition markers
    #[serde(default = "default_stat_dir")]
    pub stat_dir: PathBuf,
}

fn default_stat_dir() -> PathBuf {
    PathBuf::from(crate::constants::paths::STAT_DIR)
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CoolerError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller.interval_sec == 0 {
            return Err(CoolerError::invalid_config(
                "controller.interval_sec",
                "must be positive",
            ));
        }
        if self.actuator.control.interval_sec == 0 {
            return Err(CoolerError::invalid_config(
                "actuator.control.interval_sec",
                "must be positive",
            ));
        }
        if self.actuator.monitor.interval_sec == 0 {
            return Err(CoolerError::invalid_config(
                "actuator.monitor.interval_sec",
                "must be positive",
            ));
        }
        if self.actuator.monitor.flow.on.max.is_empty() {
            return Err(CoolerError::invalid_config(
                "actuator.monitor.flow.on.max",
                "leak threshold ladder must not be empty",
            ));
        }
        let mut prev = f64::NEG_INFINITY;
        for threshold in &self.actuator.monitor.flow.on.max {
            if *threshold <= prev {
                return Err(CoolerError::invalid_config(
                    "actuator.monitor.flow.on.max",
                    "leak thresholds must be strictly increasing",
                ));
            }
            prev = *threshold;
        }
        if self.actuator.monitor.sense.giveup == 0 {
            return Err(CoolerError::invalid_config(
                "actuator.monitor.sense.giveup",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// A config suitable for tests and dummy mode, rooted at `state_dir`.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            controller: ControllerConfig {
                interval_sec: 60,
                thresholds: Thresholds::default(),
                liveness: LivenessConfig {
                    file: state_dir.join("healthz").join("controller"),
                },
                watering: WateringConfig::default(),
            },
            actuator: ActuatorConfig {
                control: ControlConfig {
                    interval_sec: 10,
                    valve: ValveConfig { pin_no: 17 },
                    hazard: HazardConfig {
                        file: state_dir.join("hazard"),
                    },
                    liveness: LivenessConfig {
                        file: state_dir.join("healthz").join("actuator").join("control"),
                    },
                },
                monitor: MonitorConfig {
                    interval_sec: 10,
                    sense: SenseConfig::default(),
                    flow: FlowConfig::default(),
                    liveness: LivenessConfig {
                        file: state_dir.join("healthz").join("actuator").join("monitor"),
                    },
                },
                subscribe: SubscribeConfig {
                    liveness: LivenessConfig {
                        file: state_dir.join("healthz").join("actuator").join("subscribe"),
                    },
                },
            },
            webui: WebuiConfig {
                port: 5000,
                subscribe: SubscribeConfig {
                    liveness: LivenessConfig {
                        file: state_dir.join("healthz").join("webui").join("subscribe"),
                    },
                },
            },
            stat_dir: state_dir.join("stat"),
        }
    }
}

/// Settings resolved from CLI flags and environment overrides, as opposed
/// to the on-disk config file.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub control_host: String,
    pub pub_port: u16,
    /// Port the real publisher binds; the caching proxy republishes it on
    /// `pub_port`
    pub real_port: u16,
    pub log_port: u16,
    /// 0 disables the secondary ActuatorStatus publisher
    pub status_pub_port: u16,
    /// 0 means unbounded
    pub msg_count: u32,
    /// Time acceleration factor (intervals and duties divided by this)
    pub speedup: u32,
    pub idle_timeout_sec: u32,
    pub dummy_mode: bool,
    pub debug_mode: bool,
    pub disable_proxy: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            control_host: "localhost".into(),
            pub_port: 2222,
            real_port: 2200,
            log_port: 5001,
            status_pub_port: 0,
            msg_count: 0,
            speedup: 1,
            idle_timeout_sec: 0,
            dummy_mode: false,
            debug_mode: false,
            disable_proxy: false,
        }
    }
}

impl RuntimeSettings {
    pub fn effective_interval(&self, interval_sec: u32) -> f64 {
        f64::from(interval_sec) / f64::from(self.speedup.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_consistent() {
        let th = Thresholds::default();
        assert!(th.temp_cooling < th.temp_mid);
        assert!(th.temp_mid < th.temp_high_l);
        assert!(th.temp_high_l < th.temp_high_h);
        assert!(th.power_work < th.power_normal);
        assert!(th.power_normal < th.power_full);
        assert!(th.solar_rad_low < th.solar_rad_daytime);
        assert!(th.solar_rad_daytime < th.solar_rad_high + 101.0);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::for_state_dir("/tmp/mistcool-test");
        config.controller.interval_sec = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsorted_leak_ladder() {
        let mut config = Config::for_state_dir("/tmp/mistcool-test");
        config.actuator.monitor.flow.on.max = vec![3.0, 2.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_state_dir(dir.path());
        let path = dir.path().join("config.json");
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.controller.interval_sec, 60);
        assert_eq!(loaded.actuator.control.valve.pin_no, 17);
        assert_eq!(loaded.actuator.monitor.flow.on.max, vec![2.0, 3.5]);
    }

    #[test]
    fn test_effective_interval_scales_with_speedup() {
        let settings = RuntimeSettings {
            speedup: 20,
            ..RuntimeSettings::default()
        };
        assert!((settings.effective_interval(60) - 3.0).abs() < f64::EPSILON);
    }
}
