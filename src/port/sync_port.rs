//! Real serial port backed by the `serialport` crate.

use super::error::PortError;
use super::traits::{PortSettings, SerialPortAdapter};
use std::io::{Read, Write};

/// Synchronous serial port wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SyncSerialPort {
    /// Acquire a handle on the device at `path`.
    ///
    /// # Example
    /// ```no_run
    /// use sensor_bridge::port::{PortSettings, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyACM0", &PortSettings::default())?;
    /// # Ok::<(), sensor_bridge::port::PortError>(())
    /// ```
    pub fn open(path: &str, settings: &PortSettings) -> Result<Self, PortError> {
        let port = serialport::new(path, settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(path),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: path.to_owned(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_device_reports_not_found() {
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &PortSettings::default());
        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
