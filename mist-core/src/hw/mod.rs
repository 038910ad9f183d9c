//! Hardware capability traits and their implementations.
//!
//! The core never talks to hardware directly; it receives these capabilities
//! from the binaries. Real deployments inject the sysfs GPIO output and the
//! serial flow sensor, tests and dummy mode inject the in-memory doubles.

mod flow;
mod gpio;

pub use flow::{DummyFlowSensor, FlowSensor};
pub use gpio::{DigitalOutput, MemoryOutput, SysfsOutput};

#[cfg(test)]
pub use flow::MockFlowSensor;
