// Shared transport configuration for building reqwest::Client instances.
//
// The middleware and storage clients share TLS and timeout settings
// through this module. Storage adds its auth headers on top.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error::Error;

const USER_AGENT: &str = concat!("homelink/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode for the HTTP tiers.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the bundled webpki roots.
    #[default]
    System,
    /// Additionally trust a CA certificate from the given PEM file.
    CustomCa(PathBuf),
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a `reqwest::Client` with additional default headers.
    ///
    /// Used by the storage client to inject `apikey` and `Authorization`.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        if let TlsMode::CustomCa(path) = &self.tls {
            let cert_pem = std::fs::read(path)
                .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
            let cert = reqwest::Certificate::from_pem(&cert_pem)
                .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Timeout in whole seconds, for error reporting.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}

/// Read a response body, turning non-success statuses into [`Error::Status`]
/// and JSON failures into [`Error::Deserialization`].
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            endpoint: endpoint.to_owned(),
            message: error_message(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (endpoint: {endpoint})"),
        body,
    })
}

/// Pull a human-readable message out of an error body.
///
/// The middleware answers `{error, details}`; PostgREST answers
/// `{message, hint, ...}`. Anything else is passed through trimmed.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let pick = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        match (pick("error"), pick("details"), pick("message")) {
            (Some(error), Some(details), _) => return format!("{error}: {details}"),
            (Some(error), None, _) => return error,
            (None, _, Some(message)) => return message,
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "<empty body>".into()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_middleware_shape() {
        let body = r#"{"error":"Failed to fetch devices","details":"db down"}"#;
        assert_eq!(error_message(body), "Failed to fetch devices: db down");
    }

    #[test]
    fn error_message_reads_postgrest_shape() {
        let body = r#"{"code":"42P01","message":"relation does not exist"}"#;
        assert_eq!(error_message(body), "relation does not exist");
    }

    #[test]
    fn error_message_falls_back_to_raw_text() {
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_message(""), "<empty body>");
    }
}
