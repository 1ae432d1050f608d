//! Link state machine, decode pipeline, and reconnect policy, driven by
//! scripted ports instead of hardware.

use parking_lot::Mutex;
use sensor_bridge::codec::DecodedRecord;
use sensor_bridge::link::{LinkConfig, LinkStateKind, SerialLink};
use sensor_bridge::port::{
    MockSerialPort, PortError, PortFactory, PortSelector, PortSettings, SerialPortAdapter,
};
use sensor_bridge::telemetry::{TelemetryCache, TelemetrySample};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

/// One scripted outcome for a locate+open attempt.
enum Script {
    LocateFail,
    OpenFail,
    Port(MockSerialPort),
}

/// Factory that hands out scripted outcomes in order and counts attempts.
struct ScriptedFactory {
    script: Mutex<VecDeque<Script>>,
    resolves: AtomicUsize,
    opens: AtomicUsize,
}

impl ScriptedFactory {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            resolves: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        })
    }

    fn resolve_attempts(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    fn open_attempts(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortFactory for ScriptedFactory {
    fn resolve(&self, _selector: &PortSelector) -> Result<String, PortError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        match script.front() {
            Some(Script::LocateFail) => {
                script.pop_front();
                Err(PortError::NoDeviceMatched)
            }
            _ => Ok("MOCK0".to_owned()),
        }
    }

    fn open(
        &self,
        _path: &str,
        _settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        match script.pop_front() {
            Some(Script::Port(port)) => Ok(Box::new(port)),
            _ => Err(PortError::not_found("MOCK0")),
        }
    }
}

fn fast_config() -> LinkConfig {
    LinkConfig {
        read_interval: Duration::from_millis(5),
        ..LinkConfig::default()
    }
}

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn decoded_telemetry_reaches_cache_and_record_stream() {
    let cache = TelemetryCache::new();
    let link = SerialLink::new(fast_config(), cache.clone(), None);
    let script = MockSerialPort::new("MOCK0");
    link.open_adapter(Box::new(script.clone())).unwrap();

    let mut records = link.records().unwrap();
    script.push_line(r#"{"pot":512,"temp":23.5,"light":880}"#);

    let expected = TelemetrySample {
        pot: 512,
        temp: 23.5,
        light: 880,
    };
    wait_for("cache update", || cache.get() == Some(expected)).await;

    let record = tokio::time::timeout(Duration::from_secs(2), records.next())
        .await
        .expect("record in time")
        .expect("stream open")
        .expect("no lag");
    assert_eq!(record, DecodedRecord::Telemetry(expected));
}

#[tokio::test]
async fn log_text_does_not_touch_cache_or_fault_channel() {
    let cache = TelemetryCache::new();
    let link = SerialLink::new(fast_config(), cache.clone(), None);
    let script = MockSerialPort::new("MOCK0");
    link.open_adapter(Box::new(script.clone())).unwrap();

    let mut records = link.records().unwrap();
    let mut faults = link.decode_faults();
    script.push_line("not json at all");

    let record = tokio::time::timeout(Duration::from_secs(2), records.next())
        .await
        .expect("record in time")
        .expect("stream open")
        .expect("no lag");
    assert_eq!(record, DecodedRecord::LogText("not json at all".to_owned()));
    assert_eq!(cache.get(), None);
    assert!(faults.try_recv().is_err());
}

#[tokio::test]
async fn malformed_object_surfaces_fault_and_stream_continues() {
    let cache = TelemetryCache::new();
    let link = SerialLink::new(fast_config(), cache.clone(), None);
    let script = MockSerialPort::new("MOCK0");
    link.open_adapter(Box::new(script.clone())).unwrap();

    let mut records = link.records().unwrap();
    let mut faults = link.decode_faults();
    script.push_line(r#"{"pot":1,}"#);
    script.push_line(r#"{"pot":1,"temp":2.0,"light":3}"#);

    let fault = tokio::time::timeout(Duration::from_secs(2), faults.recv())
        .await
        .expect("fault in time")
        .expect("fault channel open");
    assert_eq!(fault.line, r#"{"pot":1,}"#);

    // The malformed line is still delivered as log text, and the next line
    // decodes normally: the stream was not closed.
    let first = tokio::time::timeout(Duration::from_secs(2), records.next())
        .await
        .expect("first record")
        .expect("stream open")
        .expect("no lag");
    assert!(matches!(first, DecodedRecord::LogText(_)));

    let second = tokio::time::timeout(Duration::from_secs(2), records.next())
        .await
        .expect("second record")
        .expect("stream open")
        .expect("no lag");
    assert_eq!(
        second,
        DecodedRecord::Telemetry(TelemetrySample {
            pot: 1,
            temp: 2.0,
            light: 3,
        })
    );
    assert_eq!(
        cache.get(),
        Some(TelemetrySample {
            pot: 1,
            temp: 2.0,
            light: 3,
        })
    );
}

#[tokio::test]
async fn record_stream_ends_when_link_closes() {
    let link = SerialLink::new(fast_config(), TelemetryCache::new(), None);
    link.open_adapter(Box::new(MockSerialPort::new("MOCK0")))
        .unwrap();

    let mut records = link.records().unwrap();
    link.close();

    let end = tokio::time::timeout(Duration::from_secs(2), records.next())
        .await
        .expect("stream should end");
    assert!(end.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cache_reads_are_never_torn() {
    let cache = TelemetryCache::new();
    let link = SerialLink::new(fast_config(), cache.clone(), None);
    let script = MockSerialPort::new("MOCK0");
    link.open_adapter(Box::new(script.clone())).unwrap();

    // Every sample carries the same value in all three fields, so a read that
    // mixed two decode events would be visible immediately.
    for i in 1..=200 {
        script.push_line(&format!(r#"{{"pot":{i},"temp":{i}.0,"light":{i}}}"#));
    }

    let reader_cache = cache.clone();
    let reader = tokio::spawn(async move {
        loop {
            if let Some(sample) = reader_cache.get() {
                assert_eq!(sample.pot, sample.light, "torn read");
                assert_eq!(sample.temp, f64::from(sample.pot), "torn read");
                if sample.pot == 200 {
                    return;
                }
            }
            tokio::task::yield_now().await;
        }
    });

    tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("all samples observed in time")
        .expect("reader task");
}

#[tokio::test(start_paused = true)]
async fn device_fault_schedules_one_delayed_reopen() {
    let first = MockSerialPort::new("MOCK0");
    let second = MockSerialPort::new("MOCK1");
    let factory = ScriptedFactory::new(vec![
        Script::Port(first.clone()),
        Script::Port(second.clone()),
    ]);
    let link = SerialLink::with_factory(
        fast_config(),
        TelemetryCache::new(),
        None,
        factory.clone(),
    );

    link.connect();
    assert_eq!(link.state(), LinkStateKind::Opened);
    assert_eq!(factory.open_attempts(), 1);

    let before_fault = tokio::time::Instant::now();
    first.fail_reads();
    wait_for("reopen", || factory.open_attempts() == 2).await;

    assert_eq!(link.state(), LinkStateKind::Opened);
    assert!(
        before_fault.elapsed() >= Duration::from_millis(3000),
        "reopen must wait at least the error delay"
    );
    assert!(!link.retry_scheduled());
}

#[tokio::test(start_paused = true)]
async fn locate_failure_uses_the_slower_delay() {
    let port = MockSerialPort::new("MOCK0");
    let factory = ScriptedFactory::new(vec![Script::LocateFail, Script::Port(port.clone())]);
    let link = SerialLink::with_factory(
        fast_config(),
        TelemetryCache::new(),
        None,
        factory.clone(),
    );

    let started = tokio::time::Instant::now();
    link.connect();
    assert_eq!(link.state(), LinkStateKind::Closed);
    assert!(link.retry_scheduled());

    wait_for("open after locate retry", || factory.open_attempts() == 1).await;
    assert_eq!(link.state(), LinkStateKind::Opened);
    assert!(
        started.elapsed() >= Duration::from_millis(5000),
        "locate retries use the 5000 ms delay"
    );
}

#[tokio::test(start_paused = true)]
async fn open_failure_uses_the_error_delay() {
    let port = MockSerialPort::new("MOCK0");
    let factory = ScriptedFactory::new(vec![Script::OpenFail, Script::Port(port)]);
    let link = SerialLink::with_factory(
        fast_config(),
        TelemetryCache::new(),
        None,
        factory.clone(),
    );

    let started = tokio::time::Instant::now();
    link.connect();
    assert_eq!(link.state(), LinkStateKind::Closed);
    assert!(link.retry_scheduled());

    wait_for("reopen after open failure", || factory.open_attempts() == 2).await;
    assert_eq!(link.state(), LinkStateKind::Opened);
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(3000) && elapsed < Duration::from_millis(5000),
        "open failures retry on the error delay, not the locate delay"
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let factory = ScriptedFactory::new(vec![Script::LocateFail]);
    let link = SerialLink::with_factory(
        fast_config(),
        TelemetryCache::new(),
        None,
        factory.clone(),
    );

    link.connect();
    assert!(link.retry_scheduled());
    assert_eq!(factory.resolve_attempts(), 1);

    link.disconnect();
    assert!(!link.reconnect_enabled());
    assert!(!link.retry_scheduled());

    // Well past both delays: nothing may fire.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(factory.resolve_attempts(), 1);
    assert_eq!(link.state(), LinkStateKind::Closed);
}

#[tokio::test(start_paused = true)]
async fn explicit_close_never_schedules_retry() {
    let port = MockSerialPort::new("MOCK0");
    let factory = ScriptedFactory::new(vec![Script::Port(port)]);
    let link = SerialLink::with_factory(
        fast_config(),
        TelemetryCache::new(),
        None,
        factory.clone(),
    );

    link.connect();
    assert_eq!(link.state(), LinkStateKind::Opened);

    link.close();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(link.state(), LinkStateKind::Closed);
    assert!(!link.retry_scheduled());
    assert_eq!(factory.open_attempts(), 1);
}

#[tokio::test]
async fn device_fault_without_policy_stays_closed() {
    let port = MockSerialPort::new("MOCK0");
    let link = SerialLink::new(fast_config(), TelemetryCache::new(), None);
    link.open_adapter(Box::new(port.clone())).unwrap();

    port.fail_reads();
    wait_for("fault close", || link.state() == LinkStateKind::Closed).await;
    assert!(!link.retry_scheduled());
}
