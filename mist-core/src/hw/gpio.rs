//! Digital output abstraction for the solenoid valve driver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use mist_error::{CoolerError, Result};

/// A single digital output line. Implementations must be safe to share
/// across threads; the valve controller serialises all writes anyway.
#[cfg_attr(test, mockall::automock)]
pub trait DigitalOutput: Send + Sync {
    /// Drive the line high (true) or low (false).
    fn write(&self, high: bool) -> Result<()>;

    /// Read back the current electrical state.
    fn read(&self) -> Result<bool>;
}

/// Sysfs GPIO output (`/sys/class/gpio`).
///
/// Export and direction setup happen once at construction; afterwards each
/// write is a single small sysfs write, cheap enough to stay synchronous.
pub struct SysfsOutput {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsOutput {
    pub fn new(pin: u32) -> Result<Self> {
        let base = PathBuf::from("/sys/class/gpio");
        let pin_dir = base.join(format!("gpio{pin}"));

        if !pin_dir.exists() {
            std::fs::write(base.join("export"), pin.to_string()).map_err(|e| {
                CoolerError::OutputWrite {
                    pin,
                    reason: format!("export failed: {e}"),
                }
            })?;
        }

        std::fs::write(pin_dir.join("direction"), "out").map_err(|e| CoolerError::OutputWrite {
            pin,
            reason: format!("direction failed: {e}"),
        })?;

        Ok(Self {
            pin,
            value_path: pin_dir.join("value"),
        })
    }
}

impl DigitalOutput for SysfsOutput {
    fn write(&self, high: bool) -> Result<()> {
        std::fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(|e| {
            CoolerError::OutputWrite {
                pin: self.pin,
                reason: e.to_string(),
            }
        })
    }

    fn read(&self) -> Result<bool> {
        let content = std::fs::read_to_string(&self.value_path).map_err(|e| CoolerError::OutputRead {
            pin: self.pin,
            reason: e.to_string(),
        })?;
        Ok(content.trim() == "1")
    }
}

/// In-memory output for tests and dummy mode.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    state: AtomicBool,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DigitalOutput for MemoryOutput {
    fn write(&self, high: bool) -> Result<()> {
        self.state.store(high, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Result<bool> {
        Ok(self.state.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_output_round_trip() {
        let output = MemoryOutput::new();
        assert!(!output.read().unwrap());
        output.write(true).unwrap();
        assert!(output.read().unwrap());
        output.write(false).unwrap();
        assert!(!output.read().unwrap());
    }
}
