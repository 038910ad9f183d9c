//! Mistcool daemons.
//!
//! Hosts the long-running tasks of the three processes (controller,
//! actuator, WebUI) plus the healthz probe. Binaries live in `src/bin/`;
//! everything here is shared task plumbing so integration tests can drive
//! the same code the binaries run.

pub mod actuator;
pub mod cli;
pub mod controller;
pub mod logging;
pub mod shutdown;
pub mod transport;
pub mod webui;
