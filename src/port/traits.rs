//! Core traits for the serial port seam.
//!
//! The link's state machine talks to the port through [`SerialPortAdapter`],
//! and acquires handles through [`PortFactory`], so both real hardware and
//! scripted test doubles can drive it.

use super::error::PortError;
use super::locator::PortSelector;
use std::time::Duration;

/// Parameters used when acquiring a port handle.
#[derive(Debug, Clone)]
pub struct PortSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Read timeout. Poll-driven readers keep this short so an idle port
    /// surfaces as a quiet timeout rather than a stalled task.
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_millis(50),
        }
    }
}

/// I/O operations the link needs from an open serial port.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the port; returns the number actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes into `buffer`; returns the number of bytes read. A quiet
    /// wire is reported as a timeout-kind I/O error, not as zero bytes.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// The system path of this port.
    fn name(&self) -> &str;
}

/// Locates and acquires port handles.
///
/// The production implementation talks to the operating system; tests
/// substitute a scripted factory to exercise locate failures, open failures,
/// and reconnection without hardware.
pub trait PortFactory: Send + Sync {
    /// Resolve a selector to a concrete device path.
    fn resolve(&self, selector: &PortSelector) -> Result<String, PortError>;

    /// Acquire a handle on the device at `path`.
    fn open(
        &self,
        path: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout, Duration::from_millis(50));
    }
}
