//! Serial-link lifecycle manager.
//!
//! [`SerialLink`] owns the physical connection: the open→opened→closed state
//! machine, the reader task that decodes the byte stream into records, the
//! write path with its fault flag, and the auto-reconnect policy. Nothing
//! else in the process touches the port handle directly.

mod error;

pub use error::{LinkError, SinkError};

use crate::codec::{DecodedLine, DecodedRecord, LineCodec, ParseError};
use crate::port::{PortFactory, PortSelector, PortSettings, SerialPortAdapter, SystemPortFactory};
use crate::telemetry::{TelemetryCache, TelemetrySample};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Capacity of the per-open record channel and the fault channel.
const CHANNEL_CAPACITY: usize = 64;

/// Read buffer size for one poll of the port.
const READ_BUF_SIZE: usize = 1024;

/// Destination for decoded telemetry samples.
///
/// Called once per decoded record, fire-and-forget: a failed save is logged
/// and never reaches the device path.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn save(&self, sample: TelemetrySample) -> Result<(), SinkError>;
}

/// Tuning knobs for the link.
///
/// The two retry delays preserve the historical behavior of retrying slower
/// after a failed locate than after a runtime fault; neither value is
/// load-bearing.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub selector: PortSelector,
    pub baud_rate: u32,
    pub read_interval: Duration,
    pub error_retry_delay: Duration,
    pub locate_retry_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            selector: PortSelector::Auto,
            baud_rate: 9600,
            read_interval: Duration::from_millis(50),
            error_retry_delay: Duration::from_millis(3000),
            locate_retry_delay: Duration::from_millis(5000),
        }
    }
}

/// Internal state. The Opened variant owns the handle and the per-open
/// record channel, so dropping it releases both.
enum LinkState {
    Closed,
    Opening,
    Opened {
        port: Box<dyn SerialPortAdapter>,
        records_tx: broadcast::Sender<DecodedRecord>,
        write_faulted: bool,
    },
    Closing,
    Forgotten,
}

impl LinkState {
    fn kind(&self) -> LinkStateKind {
        match self {
            Self::Closed => LinkStateKind::Closed,
            Self::Opening => LinkStateKind::Opening,
            Self::Opened { .. } => LinkStateKind::Opened,
            Self::Closing => LinkStateKind::Closing,
            Self::Forgotten => LinkStateKind::Forgotten,
        }
    }
}

/// Externally visible link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStateKind {
    Closed,
    Opening,
    Opened,
    Closing,
    Forgotten,
}

impl fmt::Display for LinkStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::Closing => "closing",
            Self::Forgotten => "forgotten",
        };
        f.write_str(name)
    }
}

struct LinkShared {
    config: LinkConfig,
    factory: Arc<dyn PortFactory>,
    state: Mutex<LinkState>,
    /// Incremented on every successful open; lets a stale reader task detect
    /// that the link it served has been reopened behind its back.
    epoch: AtomicU64,
    auto_reconnect: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    retry: Mutex<Option<JoinHandle<()>>>,
    faults_tx: broadcast::Sender<ParseError>,
    cache: TelemetryCache,
    sink: Option<Arc<dyn SampleSink>>,
}

/// The serial-link lifecycle manager.
///
/// Cheap to clone; every clone drives the same underlying link. One instance
/// is active per process.
#[derive(Clone)]
pub struct SerialLink {
    shared: Arc<LinkShared>,
}

impl SerialLink {
    pub fn new(
        config: LinkConfig,
        cache: TelemetryCache,
        sink: Option<Arc<dyn SampleSink>>,
    ) -> Self {
        Self::with_factory(config, cache, sink, Arc::new(SystemPortFactory))
    }

    /// Build a link over a custom port factory. Tests use this to script
    /// locate and open outcomes without hardware.
    pub fn with_factory(
        config: LinkConfig,
        cache: TelemetryCache,
        sink: Option<Arc<dyn SampleSink>>,
        factory: Arc<dyn PortFactory>,
    ) -> Self {
        let (faults_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(LinkShared {
                config,
                factory,
                state: Mutex::new(LinkState::Closed),
                epoch: AtomicU64::new(0),
                auto_reconnect: AtomicBool::new(false),
                reader: Mutex::new(None),
                retry: Mutex::new(None),
                faults_tx,
                cache,
                sink,
            }),
        }
    }

    /// Current state of the link.
    pub fn state(&self) -> LinkStateKind {
        self.shared.state.lock().kind()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkStateKind::Opened
    }

    /// Whether the auto-reconnect policy is in force.
    pub fn reconnect_enabled(&self) -> bool {
        self.shared.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Whether a reopen attempt is currently scheduled.
    pub fn retry_scheduled(&self) -> bool {
        self.shared
            .retry
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Single open attempt against the configured selector.
    ///
    /// Closed→Opening→Opened on success, back to Closed on failure. Never
    /// schedules a retry; [`SerialLink::connect`] layers the reconnect policy
    /// on top.
    pub fn open(&self) -> Result<(), LinkError> {
        self.begin_opening()?;

        let path = match self.shared.factory.resolve(&self.shared.config.selector) {
            Ok(path) => path,
            Err(err) => {
                self.abort_opening();
                return Err(LinkError::PortNotFound(err));
            }
        };

        let settings = PortSettings {
            baud_rate: self.shared.config.baud_rate,
            timeout: self.shared.config.read_interval,
        };
        match self.shared.factory.open(&path, &settings) {
            Ok(port) => {
                self.install(port);
                info!(port = %path, "serial link opened");
                Ok(())
            }
            Err(err) => {
                self.abort_opening();
                Err(LinkError::PortOpen(err))
            }
        }
    }

    /// Open over an already-acquired adapter. Same state machine as `open`;
    /// this is the seam tests use to drive the link with a mock port.
    pub fn open_adapter(&self, port: Box<dyn SerialPortAdapter>) -> Result<(), LinkError> {
        self.begin_opening()?;
        debug!(port = port.name(), "serial link opened over adapter");
        self.install(port);
        Ok(())
    }

    fn begin_opening(&self) -> Result<(), LinkError> {
        let mut st = self.shared.state.lock();
        match &*st {
            LinkState::Closed => {
                *st = LinkState::Opening;
                Ok(())
            }
            other => Err(LinkError::InvalidState {
                expected: "closed",
                actual: other.kind(),
            }),
        }
    }

    fn abort_opening(&self) {
        let mut st = self.shared.state.lock();
        if matches!(&*st, LinkState::Opening) {
            *st = LinkState::Closed;
        }
    }

    fn install(&self, port: Box<dyn SerialPortAdapter>) {
        let (records_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut st = self.shared.state.lock();
            if !matches!(&*st, LinkState::Opening) {
                // A concurrent forget overtook this open; leave its state be.
                return;
            }
            *st = LinkState::Opened {
                port,
                records_tx: records_tx.clone(),
                write_faulted: false,
            };
        }
        let handle = tokio::spawn(reader_task(Arc::clone(&self.shared), epoch, records_tx));
        if let Some(old) = self.shared.reader.lock().replace(handle) {
            old.abort();
        }
    }

    /// Explicit close: Opened→Closing→Closed. No-op in any other state,
    /// never schedules a retry.
    pub fn close(&self) {
        let prev = {
            let mut st = self.shared.state.lock();
            if !matches!(&*st, LinkState::Opened { .. }) {
                return;
            }
            let prev = std::mem::replace(&mut *st, LinkState::Closing);
            *st = LinkState::Closed;
            prev
        };
        if let Some(reader) = self.shared.reader.lock().take() {
            reader.abort();
        }
        // Dropping the Opened state releases the handle and ends the record
        // stream of this open.
        drop(prev);
        info!("serial link closed");
    }

    /// Terminal teardown: the link can no longer be opened.
    pub fn forget(&self) {
        self.shared.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(retry) = self.shared.retry.lock().take() {
            retry.abort();
        }
        let prev = std::mem::replace(&mut *self.shared.state.lock(), LinkState::Forgotten);
        if let Some(reader) = self.shared.reader.lock().take() {
            reader.abort();
        }
        drop(prev);
        info!("serial link forgotten");
    }

    /// Write raw bytes to the device.
    ///
    /// Valid only while Opened with a clean write sink; a failed write marks
    /// the sink faulted, and further writes fail until the link is reopened.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, LinkError> {
        let mut st = self.shared.state.lock();
        match &mut *st {
            LinkState::Opened {
                port,
                write_faulted,
                ..
            } => {
                if *write_faulted {
                    return Err(LinkError::WriteFault);
                }
                match port.write_bytes(bytes) {
                    Ok(written) => Ok(written),
                    Err(err) => {
                        *write_faulted = true;
                        warn!(error = %err, "serial write failed; write sink faulted");
                        Err(LinkError::Write(err))
                    }
                }
            }
            _ => Err(LinkError::NotOpen),
        }
    }

    /// Subscribe to the decoded records of the current open.
    ///
    /// The stream ends when the link closes or a read fault tears it down;
    /// each open gets a fresh stream.
    pub fn records(&self) -> Result<BroadcastStream<DecodedRecord>, LinkError> {
        let st = self.shared.state.lock();
        match &*st {
            LinkState::Opened { records_tx, .. } => {
                Ok(BroadcastStream::new(records_tx.subscribe()))
            }
            _ => Err(LinkError::NotOpen),
        }
    }

    /// Subscribe to decode faults (malformed telemetry lines). The channel
    /// outlives individual opens.
    pub fn decode_faults(&self) -> broadcast::Receiver<ParseError> {
        self.shared.faults_tx.subscribe()
    }

    /// Enable auto-reconnect and try to open.
    ///
    /// A locate miss schedules a retry after the locate delay, any other
    /// failure after the error delay. Calling this while the link is already
    /// opened just re-arms the policy.
    pub fn connect(&self) {
        self.shared.auto_reconnect.store(true, Ordering::SeqCst);
        match self.open() {
            Ok(()) => {}
            Err(LinkError::InvalidState { .. }) => {}
            Err(err @ LinkError::PortNotFound(_)) => {
                warn!(error = %err, "device not located; retry scheduled");
                self.schedule_retry(self.shared.config.locate_retry_delay);
            }
            Err(err) => {
                warn!(error = %err, "serial open failed; retry scheduled");
                self.schedule_retry(self.shared.config.error_retry_delay);
            }
        }
    }

    /// Disable auto-reconnect, cancel any pending retry, and close.
    ///
    /// Idempotent. This is the single authoritative way to suppress the
    /// reconnect policy; re-enabling it takes another `connect`.
    pub fn disconnect(&self) {
        self.shared.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(retry) = self.shared.retry.lock().take() {
            retry.abort();
        }
        self.close();
    }

    fn schedule_retry(&self, delay: Duration) {
        let link = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Consume our own slot before reattempting, so a failure can
            // schedule the next retry into an empty one.
            link.shared.retry.lock().take();
            if link.reconnect_enabled() {
                debug!("retrying serial open");
                link.connect();
            }
        });
        let mut slot = self.shared.retry.lock();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("state", &self.state())
            .field("reconnect_enabled", &self.reconnect_enabled())
            .finish()
    }
}

/// Poll the port, frame and classify lines, and fan the results out to the
/// cache, the sink, and record subscribers. Exits when the link it was
/// spawned for is no longer the current open.
async fn reader_task(
    shared: Arc<LinkShared>,
    epoch: u64,
    records_tx: broadcast::Sender<DecodedRecord>,
) {
    let mut codec = LineCodec::new();
    let mut interval = tokio::time::interval(shared.config.read_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        interval.tick().await;
        if shared.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }

        let read = {
            let mut st = shared.state.lock();
            match &mut *st {
                LinkState::Opened { port, .. } => Some(port.read_bytes(&mut buf)),
                _ => None,
            }
        };

        match read {
            None => return,
            Some(Ok(0)) => {}
            Some(Ok(n)) => {
                for decoded in codec.feed(&buf[..n]) {
                    dispatch(&shared, &records_tx, decoded);
                }
            }
            Some(Err(err)) if err.is_quiet_read() => {}
            Some(Err(err)) => {
                warn!(error = %err, "serial read fault; closing link");
                fault_close(&shared, epoch);
                return;
            }
        }
    }
}

/// Deliver one decoded line: fault channel, cache, persistence, record
/// subscribers — in that order, so the cache is current before any record
/// listener observes the sample.
fn dispatch(
    shared: &Arc<LinkShared>,
    records_tx: &broadcast::Sender<DecodedRecord>,
    decoded: DecodedLine,
) {
    if let Some(fault) = decoded.fault {
        warn!(line = %fault.line, reason = %fault.reason, "malformed telemetry line");
        let _ = shared.faults_tx.send(fault);
    }

    if let DecodedRecord::Telemetry(sample) = &decoded.record {
        shared.cache.set(*sample);
        if let Some(sink) = &shared.sink {
            let sink = Arc::clone(sink);
            let sample = *sample;
            tokio::spawn(async move {
                if let Err(err) = sink.save(sample).await {
                    warn!(error = %err, "failed to persist sample");
                }
            });
        }
    }

    let _ = records_tx.send(decoded.record);
}

/// Tear down after a device-side fault and, when the policy allows, schedule
/// exactly one reopen attempt.
fn fault_close(shared: &Arc<LinkShared>, epoch: u64) {
    let prev = {
        let mut st = shared.state.lock();
        if shared.epoch.load(Ordering::SeqCst) != epoch
            || !matches!(&*st, LinkState::Opened { .. })
        {
            return;
        }
        std::mem::replace(&mut *st, LinkState::Closed)
    };
    drop(prev);

    if shared.auto_reconnect.load(Ordering::SeqCst) {
        let link = SerialLink {
            shared: Arc::clone(shared),
        };
        link.schedule_retry(shared.config.error_retry_delay);
    }
}
