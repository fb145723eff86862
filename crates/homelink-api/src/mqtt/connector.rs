// ── Broker connector ──
//
// Owns the single live MQTT session. The session is established lazily
// by `ensure_connected` under a mutex, then driven by a background task
// that routes inbound publishes and lets rumqttc reconnect on its own.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use rumqttc::tokio_rustls::rustls::ClientConfig;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tls;
use super::topics::{TopicKind, TopicRouter};
use super::tunnel::{self, TunnelTarget};
use super::wire::{CommandEnvelope, DeviceId, StatusReport};
use crate::error::Error;

const REQUEST_CAPACITY: usize = 32;
const INBOUND_CAPACITY: usize = 256;

/// Deployed broker host. Also the name its certificate is issued for.
pub const DEFAULT_BROKER_HOST: &str = "a4e4f08b.ala.cn-hangzhou.emqxsl.cn";
pub const DEFAULT_BROKER_PORT: u16 = 8883;
pub const DEFAULT_CLIENT_ID: &str = "smarthome-app";
pub const DEFAULT_USERNAME: &str = "APP";

// ── ConnectionState ──────────────────────────────────────────────

/// Broker connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

// ── Options ──────────────────────────────────────────────────────

/// Everything needed to open the broker session.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Address to dial. When it differs from `canonical_host` the
    /// session runs through a local TLS tunnel so SNI still carries the
    /// canonical name.
    pub host: String,
    pub port: u16,
    /// Name the broker certificate is verified against.
    pub canonical_host: String,
    pub client_id: String,
    pub username: String,
    pub password: SecretString,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Pause between polls after the session drops.
    pub reconnect_delay: Duration,
    /// Pinned CA bundle (PEM). `None` uses the embedded root.
    pub ca_pem: Option<Vec<u8>>,
}

impl BrokerOptions {
    pub fn new(password: SecretString) -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.into(),
            port: DEFAULT_BROKER_PORT,
            canonical_host: DEFAULT_BROKER_HOST.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            username: DEFAULT_USERNAME.into(),
            password,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            ca_pem: None,
        }
    }

    fn pinned_pem(&self) -> &[u8] {
        self.ca_pem.as_deref().unwrap_or(tls::PINNED_ROOT_PEM)
    }

    /// Whether the dialed address differs from the certificate's name.
    fn needs_tunnel(&self) -> bool {
        !self.host.eq_ignore_ascii_case(&self.canonical_host)
    }

    /// Options for dialing the broker directly over TLS. The dialed name
    /// doubles as SNI, so this is only used when it is the canonical one.
    fn mqtt_options(&self, tls: Arc<ClientConfig>) -> MqttOptions {
        let mut opts = self.session_options(&self.canonical_host, self.port);
        opts.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(tls)));
        opts
    }

    /// Options for a session carried by a local TLS tunnel.
    fn tunneled_options(&self, local: SocketAddr) -> MqttOptions {
        self.session_options(&local.ip().to_string(), local.port())
    }

    fn session_options(&self, host: &str, port: u16) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, host, port);
        opts.set_keep_alive(self.keep_alive);
        opts.set_credentials(&self.username, self.password.expose_secret());
        opts.set_clean_session(true);
        opts
    }
}

// ── Inbound ──────────────────────────────────────────────────────

/// A decoded message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Status(StatusReport),
    ControlEcho {
        device: DeviceId,
        envelope: CommandEnvelope,
    },
}

// ── MqttConnector ────────────────────────────────────────────────

/// Handle to the broker session. Cheaply cloneable.
#[derive(Clone)]
pub struct MqttConnector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    options: BrokerOptions,
    router: TopicRouter,
    client: ArcSwapOption<AsyncClient>,
    connect_lock: Mutex<()>,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttConnector {
    /// Create a connector. Does NOT connect. Decoded inbound messages are
    /// delivered on the returned receiver, in arrival order.
    pub fn new(
        options: BrokerOptions,
        router: TopicRouter,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Inbound>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let connector = Self {
            inner: Arc::new(ConnectorInner {
                options,
                router,
                client: ArcSwapOption::from(None),
                connect_lock: Mutex::new(()),
                state_tx,
                inbound_tx,
                cancel,
                task: Mutex::new(None),
            }),
        };
        (connector, inbound_rx)
    }

    pub fn router(&self) -> &TopicRouter {
        &self.inner.router
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state_tx.borrow() == ConnectionState::Connected
    }

    /// Return once a live session exists, establishing it if needed.
    ///
    /// The first connect tries the pinned CA, then once more with the
    /// platform trust store; if both fail the pinned attempt's error is
    /// returned. Once a session exists, rumqttc reconnects in the
    /// background and this call waits for it (bounded by the connect
    /// timeout).
    pub async fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            return Ok(());
        }
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Shutdown);
        }

        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        if self.inner.client.load().is_some() {
            return self.wait_for_reconnect().await;
        }

        let options = &self.inner.options;
        self.inner.state_tx.send_replace(ConnectionState::Connecting);

        let attempt = match tls::pinned_client_config(options.pinned_pem(), &options.canonical_host) {
            Ok(config) => self.establish(config).await,
            Err(e) => Err(e),
        };
        let (client, eventloop) = match attempt {
            Ok(session) => session,
            Err(primary) => {
                warn!(error = %primary, "pinned-CA connect failed, retrying with platform trust store");
                let fallback = match tls::native_client_config(&options.canonical_host) {
                    Ok(config) => self.establish(config).await,
                    Err(e) => Err(e),
                };
                match fallback {
                    Ok(session) => {
                        info!("connected to broker with platform trust store");
                        session
                    }
                    Err(secondary) => {
                        warn!(error = %secondary, "fallback connect failed");
                        self.inner.state_tx.send_replace(ConnectionState::Failed);
                        return Err(primary);
                    }
                }
            }
        };

        subscribe(&client, &self.inner.router);
        let client = Arc::new(client);
        self.inner.client.store(Some(Arc::clone(&client)));
        self.inner.state_tx.send_replace(ConnectionState::Connected);
        info!(
            host = %options.host,
            client_id = %options.client_id,
            "connected to broker"
        );

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(run_event_loop(inner, client, eventloop));
        *self.inner.task.lock().await = Some(handle);
        Ok(())
    }

    /// Publish a command on the device's control topic (QoS 0, not retained).
    pub async fn publish_control(
        &self,
        device: &DeviceId,
        envelope: &CommandEnvelope,
    ) -> Result<(), Error> {
        self.ensure_connected().await?;
        let client = self.inner.client.load_full().ok_or(Error::Shutdown)?;
        let topic = self.inner.router.control_topic(device);
        let payload = envelope.to_payload()?;
        debug!(topic = %topic, command = %envelope.command, "publish control");
        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Stop the background loop and drop the session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.task.lock().await.take() {
            let _ = handle.await;
        }
        self.inner.client.store(None);
        self.inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
    }

    async fn establish(&self, tls: Arc<ClientConfig>) -> Result<(AsyncClient, EventLoop), Error> {
        let relay = self.inner.cancel.child_token();
        let result = self.handshake(tls, &relay).await;
        if result.is_err() {
            relay.cancel();
        }
        result
    }

    async fn handshake(
        &self,
        tls: Arc<ClientConfig>,
        relay: &CancellationToken,
    ) -> Result<(AsyncClient, EventLoop), Error> {
        let options = &self.inner.options;
        let mqtt_options = if options.needs_tunnel() {
            let target = TunnelTarget::new(&options.host, options.port, &options.canonical_host)?;
            let local = tunnel::spawn(target, tls, relay.clone()).await?;
            options.tunneled_options(local)
        } else {
            options.mqtt_options(tls)
        };
        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        debug!(session_present = ack.session_present, "connack");
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Error::MqttConnect(e.to_string())),
                }
            }
        };

        match tokio::time::timeout(options.connect_timeout, handshake).await {
            Ok(Ok(())) => Ok((client, eventloop)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout {
                timeout_secs: options.connect_timeout.as_secs(),
            }),
        }
    }

    async fn wait_for_reconnect(&self) -> Result<(), Error> {
        let timeout = self.inner.options.connect_timeout;
        let mut rx = self.inner.state_tx.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::Shutdown),
            Err(_) => Err(Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Queue both wildcard subscriptions. Status at QoS 1, control echo at QoS 0.
fn subscribe(client: &AsyncClient, router: &TopicRouter) {
    let filters = [
        (router.status_filter(), QoS::AtLeastOnce),
        (router.control_filter(), QoS::AtMostOnce),
    ];
    for (filter, qos) in filters {
        if let Err(e) = client.try_subscribe(&filter, qos) {
            warn!(filter = %filter, error = %e, "subscribe failed");
        }
    }
}

async fn run_event_loop(inner: Arc<ConnectorInner>, client: Arc<AsyncClient>, mut eventloop: EventLoop) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some(message) = route(&inner.router, &publish.topic, &publish.payload) {
                        if inner.inbound_tx.send(message).await.is_err() {
                            debug!("inbound receiver dropped");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if attempt > 0 {
                        info!(attempt, "reconnected to broker");
                    }
                    attempt = 0;
                    subscribe(&client, &inner.router);
                    inner.state_tx.send_replace(ConnectionState::Connected);
                }
                Ok(_) => {}
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, attempt, "broker connection lost");
                    inner
                        .state_tx
                        .send_replace(ConnectionState::Reconnecting { attempt });
                    tokio::select! {
                        () = inner.cancel.cancelled() => break,
                        () = tokio::time::sleep(inner.options.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "disconnect request not queued");
    }
    info!("broker event loop stopped");
}

/// Decode an inbound publish. Parse failures are logged and dropped.
fn route(router: &TopicRouter, topic: &str, payload: &[u8]) -> Option<Inbound> {
    match router.classify(topic) {
        Some(TopicKind::Status(device)) => match StatusReport::from_payload(payload, Some(&device)) {
            Ok(report) => Some(Inbound::Status(report)),
            Err(e) => {
                warn!(topic, error = %e, "dropping unparseable status report");
                None
            }
        },
        Some(TopicKind::ControlEcho(device)) => match CommandEnvelope::from_payload(payload) {
            Ok(envelope) => Some(Inbound::ControlEcho { device, envelope }),
            Err(e) => {
                debug!(topic, error = %e, "ignoring unparseable control echo");
                None
            }
        },
        None => {
            debug!(topic, "ignoring publish on unrecognized topic");
            None
        }
    }
}
