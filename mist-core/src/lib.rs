//! Mistcool Core Library
//!
//! Decision and actuation core for the outdoor-unit mist cooling system.
//!
//! # Features
//!
//! - **Decision Engine**: Pure mapping from sensor readings + AC power draw
//!   to a cooling mode index with rationale
//! - **Valve Control**: Duty-cycled solenoid valve driving with persistent
//!   transition markers that survive restarts
//! - **Flow Monitoring**: Leak, stuck-valve and closed-feed detection from
//!   the industrial flow sensor
//! - **Hazard Latch**: Persistent failure latch that forces the valve CLOSE
//!   until an operator clears it
//! - **Capabilities**: External collaborators (GPIO, flow sensor, sensor
//!   database, notifier) injected behind traits
//!
//! # Module Structure
//!
//! - `engine/` - Decision engine, profile table, dummy-mode walker
//! - `hw/` - Hardware capability traits and implementations
//! - Standalone modules for valve, monitor, hazard, work log, liveness

// Grouped modules
pub mod engine;
pub mod hw;

// Standalone modules
pub mod config;
pub mod constants;
pub mod footprint;
pub mod hazard;
pub mod liveness;
pub mod monitor;
pub mod notify;
pub mod sensor;
pub mod valve;
pub mod work_log;

// Re-export primary types
pub use config::{Config, RuntimeSettings, Thresholds};
pub use engine::{decide, gen_control_msg, Decision, DummyModeWalker};
pub use hazard::HazardRegistry;
pub use hw::{DigitalOutput, DummyFlowSensor, FlowSensor, MemoryOutput, SysfsOutput};
pub use liveness::{check_http_port, check_liveness_all, HealthzTarget};
pub use monitor::{FlowMonitor, MistCondition};
pub use notify::{DedupNotifier, EventSink, LogNotifier, Notifier, NullEventSink};
pub use sensor::{DummySensorSource, SensorSource};
pub use valve::ValveController;
pub use work_log::{WorkLog, WorkLogEntry};

// Re-export error types
pub use mist_error::{CoolerError, Result};
