//! In-memory serial port for tests.
//!
//! Clones share state, so a test keeps one handle for scripting while the
//! link owns the other.
//!
//! # Example
//! ```
//! use sensor_bridge::port::{MockSerialPort, SerialPortAdapter};
//!
//! let script = MockSerialPort::new("MOCK0");
//! let mut port = script.clone();
//!
//! script.push_line("hello");
//! let mut buffer = [0u8; 16];
//! let n = port.read_bytes(&mut buffer).unwrap();
//! assert_eq!(&buffer[..n], b"hello\n");
//!
//! port.write_bytes(b"M128\n").unwrap();
//! assert_eq!(script.written_text(), "M128\n");
//! ```

use super::error::PortError;
use super::traits::SerialPortAdapter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    read_queue: VecDeque<u8>,
    write_log: Vec<Vec<u8>>,
    fail_next_write: bool,
    read_fault: bool,
}

/// Scriptable serial port implementing [`SerialPortAdapter`].
#[derive(Debug, Clone, Default)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Enqueue raw bytes for subsequent reads.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().read_queue.extend(bytes);
    }

    /// Enqueue one newline-terminated line.
    pub fn push_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.read_queue.extend(line.as_bytes());
        state.read_queue.push_back(b'\n');
    }

    /// Make the next write fail with a broken pipe.
    pub fn fail_next_write(&self) {
        self.state.lock().fail_next_write = true;
    }

    /// Make every subsequent read fail, simulating device loss.
    pub fn fail_reads(&self) {
        self.state.lock().read_fault = true;
    }

    /// All writes performed so far, one entry per call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// The write log concatenated as (lossy) text.
    pub fn written_text(&self) -> String {
        let state = self.state.lock();
        state
            .write_log
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.read_fault {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device detached",
            )));
        }

        let mut bytes_read = 0;
        for slot in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            // Idle wire, same shape as a hardware read timeout.
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
