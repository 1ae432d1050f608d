//! Telemetry sample model and the latest-value cache.
//!
//! The device reports one JSON object per line; a successfully decoded line
//! becomes a [`TelemetrySample`]. The cache is a single slot holding the most
//! recent sample: overwritten on every decode, read concurrently by every
//! viewer session.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One decoded sensor reading.
///
/// Immutable once constructed; produced only by a successful decode of a
/// telemetry line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySample {
    pub pot: i32,
    pub temp: f64,
    pub light: i32,
}

/// Single-slot holder for the most recently decoded sample.
///
/// The slot is replaced wholesale under a short critical section, so a reader
/// never observes fields from two different decode events. Clones share the
/// slot; the link's decode path is the only writer.
#[derive(Debug, Clone, Default)]
pub struct TelemetryCache {
    slot: Arc<Mutex<Option<TelemetrySample>>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held sample.
    pub fn set(&self, sample: TelemetrySample) {
        *self.slot.lock() = Some(sample);
    }

    /// Read the most recent sample, if any decode has happened yet.
    pub fn get(&self) -> Option<TelemetrySample> {
        *self.slot.lock()
    }
}
