//! Device discovery and selection heuristics.
//!
//! The bridge serves one device; rather than requiring a configured path, it
//! can enumerate attached serial ports and pick the first one that looks like
//! the sensor board.

use super::error::PortError;
use super::sync_port::SyncSerialPort;
use super::traits::{PortFactory, PortSettings, SerialPortAdapter};
use serialport::{SerialPortInfo, SerialPortType};

/// USB vendor id assigned to Arduino boards.
pub const ARDUINO_VID: u16 = 0x2341;

/// Path fragment used by CDC-ACM devices on Linux.
pub const ACM_PATH_PATTERN: &str = "ttyACM";

/// How the link picks the device to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    /// Enumerate attached ports and take the first heuristic match.
    Auto,
    /// Open exactly this device path.
    Path(String),
}

/// One enumerated device, reduced to the fields the heuristics inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub path: String,
    pub vendor_id: Option<u16>,
    pub manufacturer: Option<String>,
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        let (vendor_id, manufacturer) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some(usb.vid), usb.manufacturer),
            _ => (None, None),
        };
        Self {
            path: info.port_name,
            vendor_id,
            manufacturer,
        }
    }
}

/// First candidate matching the device-identification heuristics: the known
/// vendor id, an ACM device path, or an "arduino" manufacturer string.
pub fn select(candidates: &[PortCandidate]) -> Option<&PortCandidate> {
    candidates.iter().find(|c| {
        c.vendor_id == Some(ARDUINO_VID)
            || c.path.contains(ACM_PATH_PATTERN)
            || c.manufacturer
                .as_deref()
                .is_some_and(|m| m.to_ascii_lowercase().contains("arduino"))
    })
}

/// Enumerate attached serial devices.
pub fn discover() -> Result<Vec<PortCandidate>, PortError> {
    let ports = serialport::available_ports().map_err(PortError::Enumerate)?;
    Ok(ports.into_iter().map(PortCandidate::from).collect())
}

/// Resolve a selector to a concrete device path.
///
/// A selector that matches nothing is a locate failure, not a crash; the
/// caller decides whether to retry.
pub fn resolve(selector: &PortSelector) -> Result<String, PortError> {
    match selector {
        PortSelector::Path(path) => Ok(path.clone()),
        PortSelector::Auto => {
            let candidates = discover()?;
            select(&candidates)
                .map(|c| c.path.clone())
                .ok_or(PortError::NoDeviceMatched)
        }
    }
}

/// Factory backed by the operating system's port list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortFactory;

impl PortFactory for SystemPortFactory {
    fn resolve(&self, selector: &PortSelector) -> Result<String, PortError> {
        resolve(selector)
    }

    fn open(
        &self,
        path: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(SyncSerialPort::open(path, settings)?))
    }
}
