//! Port-layer error types.
//!
//! Failures from locating or driving a physical serial port, separate from
//! link-level state errors.

use thiserror::Error;

/// Errors that can occur while enumerating, selecting, or using a port.
#[derive(Debug, Error)]
pub enum PortError {
    /// The named serial port does not exist on the system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// Enumeration succeeded but no device matched the selection heuristics.
    #[error("no attached device matched the selection heuristics")]
    NoDeviceMatched,

    /// Enumerating system serial ports failed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    /// Port configuration was rejected.
    #[error("port configuration error: {0}")]
    Config(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is a quiet wire rather than a device fault.
    ///
    /// Poll-driven reads report an idle port as a timeout; only everything
    /// else indicates the device side actually failed.
    pub fn is_quiet_read(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = PortError::not_found("/dev/ttyACM0");
        assert_eq!(err.to_string(), "serial port not found: /dev/ttyACM0");

        let err = PortError::config("bad baud");
        assert_eq!(err.to_string(), "port configuration error: bad baud");
    }

    #[test]
    fn timeouts_are_quiet() {
        let quiet = PortError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "idle"));
        assert!(quiet.is_quiet_read());

        let fault = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "device detached",
        ));
        assert!(!fault.is_quiet_read());

        assert!(!PortError::NoDeviceMatched.is_quiet_read());
    }
}
