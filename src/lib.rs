//! Sensor Bridge Library
//!
//! Bridges a serial-attached sensor/actuator device to realtime WebSocket
//! viewers: the link state machine owns the physical connection, decodes its
//! byte stream into records, and the session hub fans the latest sample out
//! to every connected viewer while relaying actuator commands back.
//!
//! # Modules
//!
//! - `codec`: newline framing and telemetry/log classification
//! - `config`: configuration management with TOML support
//! - `context`: explicit application context with init/shutdown lifecycle
//! - `hub`: WebSocket session hub and the viewer protocol
//! - `link`: serial-link lifecycle manager and reconnect policy
//! - `port`: port abstraction layer (real, mock, locator)
//! - `store`: SQLite persistence sink for decoded samples
//! - `telemetry`: sample model and the latest-value cache

pub mod codec;
pub mod config;
pub mod context;
pub mod hub;
pub mod link;
pub mod port;
pub mod store;
pub mod telemetry;

// Re-export commonly used types for convenience
pub use codec::{DecodedLine, DecodedRecord, LineCodec, ParseError};
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use context::AppContext;
pub use hub::{ClientMessage, ServerMessage};
pub use link::{LinkConfig, LinkError, LinkStateKind, SampleSink, SerialLink, SinkError};
pub use port::{
    MockSerialPort, PortCandidate, PortError, PortFactory, PortSelector, PortSettings,
    SerialPortAdapter, SyncSerialPort,
};
pub use store::{SampleStore, StoredSample};
pub use telemetry::{TelemetryCache, TelemetrySample};
