//! Port abstraction layer.
//!
//! Everything that touches a physical serial port lives here: the adapter
//! trait the link reads and writes through, the real implementation, the
//! device locator, and a scriptable mock for tests.

mod error;
pub mod locator;
mod mock;
mod sync_port;
mod traits;

pub use error::PortError;
pub use locator::{PortCandidate, PortSelector, SystemPortFactory, ACM_PATH_PATTERN, ARDUINO_VID};
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::{PortFactory, PortSettings, SerialPortAdapter};
