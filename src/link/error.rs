//! Link-level error types.

use super::LinkStateKind;
use crate::port::PortError;
use thiserror::Error;

/// Errors surfaced by the serial-link lifecycle manager.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No attached device matched the selector at locate time.
    #[error("no matching device: {0}")]
    PortNotFound(#[source] PortError),

    /// A device was located but the handle could not be acquired.
    #[error("failed to open serial port: {0}")]
    PortOpen(#[source] PortError),

    /// The operation is not allowed in the link's current state.
    #[error("invalid link state: expected {expected}, link is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: LinkStateKind,
    },

    /// The operation requires the link to be opened.
    #[error("link is not opened")]
    NotOpen,

    /// An earlier write failed; the write sink is invalid until reopen.
    #[error("write sink is faulted; reopen the link")]
    WriteFault,

    /// The write itself failed.
    #[error("write failed: {0}")]
    Write(#[source] PortError),
}

/// Failure reported by a sample sink.
#[derive(Debug, Error)]
#[error("sample sink error: {message}")]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_names_both_states() {
        let err = LinkError::InvalidState {
            expected: "closed",
            actual: LinkStateKind::Opened,
        };
        assert_eq!(
            err.to_string(),
            "invalid link state: expected closed, link is opened"
        );
    }
}
