// ── Runtime hub configuration ──
//
// These types describe how to reach the broker, the middleware, and the
// storage tier, and where to keep the local state cache. They never
// touch disk; the CLI builds a `HubConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use homelink_api::mqtt::connector::{
    DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, DEFAULT_CLIENT_ID, DEFAULT_USERNAME,
};
use homelink_api::mqtt::topics::DEFAULT_NAMESPACE;
use homelink_api::transport::{TlsMode, TransportConfig};
use homelink_api::BrokerOptions;

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to dial.
    pub host: String,
    pub port: u16,
    /// Name the broker certificate must carry. Defaults to `host`.
    pub tls_server_name: Option<String>,
    pub client_id: String,
    pub username: String,
    pub password: SecretString,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// PEM bundle replacing the embedded root CA.
    pub ca_file: Option<PathBuf>,
}

impl BrokerConfig {
    pub fn new(password: SecretString) -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.into(),
            port: DEFAULT_BROKER_PORT,
            tls_server_name: None,
            client_id: DEFAULT_CLIENT_ID.into(),
            username: DEFAULT_USERNAME.into(),
            password,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            ca_file: None,
        }
    }

    /// Build connector options, reading the CA override if set.
    pub(crate) fn to_options(&self) -> Result<BrokerOptions, crate::CoreError> {
        let ca_pem = match &self.ca_file {
            Some(path) => Some(std::fs::read(path).map_err(|e| crate::CoreError::Config {
                message: format!("cannot read broker CA {}: {e}", path.display()),
            })?),
            None => None,
        };
        let mut opts = BrokerOptions::new(self.password.clone());
        opts.host.clone_from(&self.host);
        opts.port = self.port;
        opts.canonical_host = self
            .tls_server_name
            .clone()
            .unwrap_or_else(|| self.host.clone());
        opts.client_id.clone_from(&self.client_id);
        opts.username.clone_from(&self.username);
        opts.keep_alive = self.keep_alive;
        opts.connect_timeout = self.connect_timeout;
        opts.ca_pem = ca_pem;
        Ok(opts)
    }
}

/// Storage tier (direct table reads) settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Project root; REST lives under `/rest/v1/`.
    pub url: Url,
    pub api_key: SecretString,
}

/// HTTP tier settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Middleware root (e.g. `http://gateway.local:3000/`).
    pub middleware_url: Url,
    /// Fallback read tier. Reads fail over only when this is set.
    pub storage: Option<StorageConfig>,
    pub timeout: Duration,
    pub ca_file: Option<PathBuf>,
}

impl HttpConfig {
    pub fn new(middleware_url: Url) -> Self {
        Self {
            middleware_url,
            storage: None,
            timeout: Duration::from_secs(30),
            ca_file: None,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self
                .ca_file
                .clone()
                .map_or(TlsMode::System, TlsMode::CustomCa),
            timeout: self.timeout,
        }
    }
}

/// Where the light state cache lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheConfig {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// Durable redb file.
    File(PathBuf),
}

/// Everything a [`Hub`](crate::Hub) needs.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Topic namespace (first topic segment).
    pub namespace: String,
    pub broker: BrokerConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
}

impl HubConfig {
    pub fn new(broker: BrokerConfig, http: HttpConfig) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            broker,
            http,
            cache: CacheConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tls_server_name_defaults_to_host() {
        let mut broker = BrokerConfig::new(SecretString::from("pw".to_owned()));
        broker.host = "10.0.0.5".into();
        assert_eq!(broker.to_options().unwrap().canonical_host, "10.0.0.5");

        broker.tls_server_name = Some("broker.example.com".into());
        let opts = broker.to_options().unwrap();
        assert_eq!(opts.host, "10.0.0.5");
        assert_eq!(opts.canonical_host, "broker.example.com");
    }

    #[test]
    fn missing_ca_file_is_config_error() {
        let mut broker = BrokerConfig::new(SecretString::from("pw".to_owned()));
        broker.ca_file = Some("/nonexistent/ca.pem".into());
        assert!(matches!(
            broker.to_options(),
            Err(crate::CoreError::Config { .. })
        ));
    }

    #[test]
    fn http_transport_carries_timeout() {
        let http = HttpConfig::new(Url::parse("http://gw.local:3000/").unwrap());
        assert_eq!(http.transport().timeout, Duration::from_secs(30));
    }
}
