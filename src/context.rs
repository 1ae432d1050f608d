//! Application context: explicit wiring of the link, cache, and store.
//!
//! Constructed once in `main` and passed down, with an explicit
//! `init`/`shutdown` lifecycle. There is no process-wide singleton; every
//! consumer receives the context it should use.

use crate::config::Config;
use crate::link::{LinkConfig, SampleSink, SerialLink};
use crate::port::PortSelector;
use crate::store::SampleStore;
use crate::telemetry::TelemetryCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything the serving layer needs. Cheap to clone; clones share the
/// underlying link, cache, and store.
#[derive(Clone)]
pub struct AppContext {
    pub link: SerialLink,
    pub cache: TelemetryCache,
    pub store: Option<Arc<SampleStore>>,
    push_interval: Duration,
}

impl AppContext {
    /// Build the context from configuration: open the store when one is
    /// configured, wire the link to the cache and the sink, and start the
    /// connect/reconnect loop.
    ///
    /// A missing device or an unavailable store never fails startup; both
    /// degrade to a warning and a retry (device) or disabled persistence
    /// (store).
    pub async fn init(config: &Config) -> Self {
        let cache = TelemetryCache::new();

        let store = match &config.storage.database_url {
            Some(url) => match SampleStore::new(url).await {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    warn!(error = %err, "sample store unavailable; persistence disabled");
                    None
                }
            },
            None => None,
        };
        let sink = store.clone().map(|s| s as Arc<dyn SampleSink>);

        let selector = match &config.serial.port {
            Some(path) => PortSelector::Path(path.clone()),
            None => PortSelector::Auto,
        };
        let link_config = LinkConfig {
            selector,
            baud_rate: config.serial.baud_rate,
            read_interval: Duration::from_millis(config.serial.read_interval_ms),
            error_retry_delay: Duration::from_millis(config.serial.reconnect.error_delay_ms),
            locate_retry_delay: Duration::from_millis(config.serial.reconnect.locate_delay_ms),
        };
        let link = SerialLink::new(link_config, cache.clone(), sink);

        if config.serial.reconnect.enabled {
            link.connect();
        } else if let Err(err) = link.open() {
            warn!(error = %err, "serial open failed and reconnect is disabled");
        }

        Self {
            link,
            cache,
            store,
            push_interval: Duration::from_millis(config.hub.push_interval_ms),
        }
    }

    /// Assemble a context from pre-built parts. Used by integration tests
    /// and embedders that manage their own wiring.
    pub fn from_parts(
        link: SerialLink,
        cache: TelemetryCache,
        store: Option<Arc<SampleStore>>,
        push_interval: Duration,
    ) -> Self {
        Self {
            link,
            cache,
            store,
            push_interval,
        }
    }

    /// Interval between telemetry pushes to each viewer session.
    pub fn push_interval(&self) -> Duration {
        self.push_interval
    }

    /// Tear down the device link and release the store.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.link.disconnect();
        if let Some(store) = &self.store {
            store.close().await;
        }
    }
}
