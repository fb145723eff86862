// Middleware HTTP client
//
// The middleware is the control plane: it relays commands to the broker
// after checking device presence, and serves cached device and sensor
// reads. Endpoint methods live in `devices.rs` and `sensors.rs`; this
// module handles URL construction and request mechanics.

mod devices;
pub mod models;
mod sensors;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, read_json};

pub use sensors::{AggQuery, RawQuery, SortOrder};

/// Raw HTTP client for the middleware service.
#[derive(Debug, Clone)]
pub struct MiddlewareClient {
    http: reqwest::Client,
    base_url: Url,
}

impl MiddlewareClient {
    /// Create a client from a `TransportConfig`. `base_url` is the service
    /// root (e.g. `http://gateway.local:3000/`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Append path segments to the base URL, percent-encoding each one.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let endpoint = url.path().to_owned();
        let resp = self.http.get(url).send().await?;
        read_json(resp, &endpoint).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let endpoint = url.path().to_owned();
        let resp = self.http.post(url).json(body).send().await?;
        read_json(resp, &endpoint).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> MiddlewareClient {
        MiddlewareClient::with_client(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn url_appends_encoded_segments() {
        let c = client("http://gw.local:3000/");
        let url = c.url(&["devices", "lamp 1", "control"]).unwrap();
        assert_eq!(url.as_str(), "http://gw.local:3000/devices/lamp%201/control");
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let c = client("http://gw.local/api/");
        let url = c.url(&["sensor", "summary"]).unwrap();
        assert_eq!(url.as_str(), "http://gw.local/api/sensor/summary");
    }
}
