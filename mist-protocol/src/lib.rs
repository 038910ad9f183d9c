//! Shared message types for the Mistcool pub/sub fabric.
//!
//! Everything the controller, actuator and WebUI exchange on the wire is
//! defined here: the integer-tagged state enums, the control and status
//! message bodies, and the `"<topic> <payload-json>"` line framing.
//!
//! The wire format is part of the system's behavioural contract: states are
//! serialized as bare integers (`0`/`1`), `ValveStatus.duration_sec` travels
//! as `duration`, and a message round-trips bit-exact through
//! `to_json`/`from_json`.

mod frame;
mod messages;
mod types;

pub use frame::{decode_frame, encode_frame, Frame, MAX_MESSAGE_SIZE};
pub use messages::{
    ActuatorStatus, ControlMessage, DutyConfig, SenseReading, SenseSnapshot, StatusInfo,
    ValveStatus,
};
pub use types::{AirconMode, CoolingState, LogLevel, ValveState};

/// Topic for control messages (controller → actuator, WebUI)
pub const PUBSUB_TOPIC: &str = "unit_cooler";

/// Topic for actuator status messages (actuator → WebUI)
pub const STATUS_TOPIC: &str = "actuator_status";
