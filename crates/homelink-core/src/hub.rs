// ── Hub ──
//
// The connection manager: built once at startup and handed to whatever
// needs the broker session, the dispatcher, the read client, or the
// state cache. Owns the single broker connector and every background
// task.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use homelink_api::{
    ConnectionState, DeviceId, Inbound, MiddlewareClient, MqttConnector, StorageClient, TopicRouter,
};

use crate::config::{CacheConfig, HubConfig};
use crate::dispatch::CommandDispatcher;
use crate::error::CoreError;
use crate::listeners::{ListenerRegistry, StatusListener, run_fanout};
use crate::model::CachedDeviceState;
use crate::query::ResilientQueryClient;
use crate::reconcile::Reconciler;
use crate::store::{LightStateCache, MemoryStore, RedbStore};
use crate::stream::DeviceWatch;

/// Shared handle to the device hub. Cheaply cloneable.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    connector: MqttConnector,
    listeners: Arc<ListenerRegistry>,
    reconciler: Arc<Reconciler>,
    dispatcher: CommandDispatcher,
    queries: ResilientQueryClient,
    cancel: CancellationToken,
    fanout: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("broker", &self.inner.config.broker.host)
            .field("namespace", &self.inner.config.namespace)
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Build the hub: HTTP clients, state cache, broker connector, and
    /// the status fan-out task. Does NOT connect to the broker; status
    /// reports flow once [`connect`](Self::connect) succeeds.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: HubConfig) -> Result<Self, CoreError> {
        Self::build(config, |inbound| inbound)
    }

    /// A hub whose fan-out reads `inbound` instead of the broker.
    #[cfg(test)]
    fn with_inbound(config: HubConfig, inbound: mpsc::Receiver<Inbound>) -> Result<Self, CoreError> {
        Self::build(config, move |_| inbound)
    }

    fn build(
        config: HubConfig,
        source: impl FnOnce(mpsc::Receiver<Inbound>) -> mpsc::Receiver<Inbound>,
    ) -> Result<Self, CoreError> {
        let transport = config.http.transport();
        let middleware = MiddlewareClient::new(config.http.middleware_url.clone(), &transport)?;
        let storage = config
            .http
            .storage
            .as_ref()
            .map(|s| StorageClient::new(&s.url, &s.api_key, &transport))
            .transpose()?;

        let cache = match &config.cache {
            CacheConfig::Memory => LightStateCache::new(Arc::new(MemoryStore::new())),
            CacheConfig::File(path) => LightStateCache::new(Arc::new(RedbStore::open(path)?)),
        };

        let cancel = CancellationToken::new();
        let router = TopicRouter::new(config.namespace.clone());
        let (connector, inbound) =
            MqttConnector::new(config.broker.to_options()?, router, cancel.child_token());

        let reconciler = Arc::new(Reconciler::new(cache));
        let listeners = Arc::new(ListenerRegistry::new());
        let reconcile_listener: Arc<dyn StatusListener> = reconciler.clone();
        listeners.add(reconcile_listener);
        let fanout = tokio::spawn(run_fanout(
            Arc::clone(&listeners),
            source(inbound),
            cancel.child_token(),
        ));

        let dispatcher =
            CommandDispatcher::new(middleware.clone(), connector.clone(), Arc::clone(&reconciler));
        let queries = ResilientQueryClient::new(middleware, storage);

        debug!(
            middleware = %config.http.middleware_url,
            storage = queries.has_fallback(),
            "hub constructed"
        );

        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                connector,
                listeners,
                reconciler,
                dispatcher,
                queries,
                cancel,
                fanout: Mutex::new(Some(fanout)),
            }),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Establish the broker session if it is not already live. Safe to
    /// call concurrently; only one connection is ever opened.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner.connector.ensure_connected().await.map_err(|e| match e {
            homelink_api::Error::MqttConnect(reason) => CoreError::ConnectionFailed {
                host: self.inner.config.broker.host.clone(),
                reason,
            },
            other => other.into(),
        })?;
        info!(host = %self.inner.config.broker.host, "hub connected");
        Ok(())
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connector.connection_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connector.is_connected()
    }

    /// Stop the broker session and every background task. Listener
    /// registrations are dropped.
    pub async fn shutdown(&self) {
        self.inner.connector.shutdown().await;
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.fanout.lock().await.take() {
            let _ = handle.await;
        }
        self.inner.listeners.clear();
        debug!("hub shut down");
    }

    // ── Components ───────────────────────────────────────────────────

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.inner.dispatcher
    }

    pub fn queries(&self) -> &ResilientQueryClient {
        &self.inner.queries
    }

    /// Direct cache access. Calls block on disk I/O when the cache is
    /// file-backed; async callers should prefer
    /// [`device_state`](Self::device_state).
    pub fn cache(&self) -> &LightStateCache {
        self.inner.reconciler.cache()
    }

    /// Cached state of one device, read on the blocking pool.
    pub async fn device_state(&self, device: &DeviceId) -> Result<CachedDeviceState, CoreError> {
        let cache = self.cache().clone();
        let device = device.clone();
        tokio::task::spawn_blocking(move || cache.snapshot(&device))
            .await
            .map_err(|e| CoreError::Internal(format!("state cache read failed: {e}")))
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.inner.listeners
    }

    /// Follow one device's reconciled state.
    pub async fn watch_device(&self, device: &DeviceId) -> Result<DeviceWatch, CoreError> {
        let reconciler = Arc::clone(&self.inner.reconciler);
        let device = device.clone();
        tokio::task::spawn_blocking(move || reconciler.watch(&device))
            .await
            .map_err(|e| CoreError::Internal(format!("state cache read failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use homelink_api::{ColorTemperature, CommandEnvelope, PowerState, StatusReport};
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;
    use crate::config::{BrokerConfig, HttpConfig};

    fn config() -> HubConfig {
        let mut broker = BrokerConfig::new(SecretString::from("secret".to_owned()));
        broker.host = "127.0.0.1".into();
        broker.port = 1;
        HubConfig::new(broker, HttpConfig::new("http://127.0.0.1:1/".parse().unwrap()))
    }

    #[tokio::test]
    async fn new_registers_reconciler_without_connecting() {
        let hub = Hub::new(config()).unwrap();
        assert_eq!(hub.listeners().len(), 1);
        assert!(!hub.is_connected());
        assert!(!hub.queries().has_fallback());
        hub.shutdown().await;
        assert!(hub.listeners().is_empty());
    }

    #[tokio::test]
    async fn watch_device_reads_cache() {
        let hub = Hub::new(config()).unwrap();
        let d: DeviceId = "lamp".parse().unwrap();
        hub.cache().set_brightness(&d, 33);
        assert_eq!(hub.watch_device(&d).await.unwrap().current().brightness, 33);
        assert_eq!(hub.device_state(&d).await.unwrap().brightness, 33);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn inbound_report_reaches_cache_and_watchers() {
        let (tx, rx) = mpsc::channel(8);
        let hub = Hub::with_inbound(config(), rx).unwrap();
        let d: DeviceId = "lamp".parse().unwrap();
        let mut watch = hub.watch_device(&d).await.unwrap();

        // Echoes of our own commands never touch the cache.
        tx.send(Inbound::ControlEcho {
            device: d.clone(),
            envelope: CommandEnvelope::new("BRIGHTNESS_SET").with_value(5),
        })
        .await
        .unwrap();
        let mut report = StatusReport::empty(d.clone());
        report.power = Some(PowerState::Off);
        report.color_temperature = Some(ColorTemperature::Cool);
        tx.send(Inbound::Status(report)).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), watch.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            seen,
            CachedDeviceState {
                brightness: crate::model::DEFAULT_BRIGHTNESS,
                color_temperature: ColorTemperature::Cool,
                power: PowerState::Off,
            }
        );
        assert_eq!(hub.device_state(&d).await.unwrap(), seen);
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn hubs_share_one_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        let hub = |path: &std::path::Path| {
            let mut cfg = config();
            cfg.cache = CacheConfig::File(path.to_owned());
            Hub::new(cfg).unwrap()
        };
        let watcher = hub(&path);
        let commander = hub(&path);
        let d: DeviceId = "lamp".parse().unwrap();

        commander.cache().set_brightness(&d, 12);
        assert_eq!(watcher.device_state(&d).await.unwrap().brightness, 12);

        let mut report = StatusReport::empty(d.clone());
        report.power = Some(PowerState::Off);
        watcher.cache().merge_report(&report);
        assert_eq!(commander.device_state(&d).await.unwrap().power, PowerState::Off);

        watcher.shutdown().await;
        commander.shutdown().await;
    }

    #[tokio::test]
    async fn file_cache_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.cache = CacheConfig::File(dir.path().join("state.redb"));
        let hub = Hub::new(cfg).unwrap();
        hub.cache().set_power(&"lamp".parse().unwrap(), homelink_api::PowerState::Off);
        hub.shutdown().await;
        assert!(dir.path().join("state.redb").exists());
    }
}
