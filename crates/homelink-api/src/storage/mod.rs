// Storage tier HTTP client
//
// Direct PostgREST-style reads against the `devices` and `sensor_data`
// tables. Consulted only when the middleware's read endpoints fail;
// never used for commands.

mod queries;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, read_json};

/// Raw HTTP client for the storage REST tier.
#[derive(Debug, Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    rest_url: Url,
}

impl StorageClient {
    /// Create a client. `project_url` is the project root; requests go to
    /// `{project_url}/rest/v1/`. The key is sent as both `apikey` and a
    /// bearer token.
    pub fn new(
        project_url: &Url,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let key = api_key.expose_secret();
        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(key)
            .map_err(|e| Error::InvalidCredential(format!("storage API key: {e}")))?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| Error::InvalidCredential(format!("storage API key: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let http = transport.build_client_with_headers(headers)?;
        let rest_url = rest_root(project_url)?;
        Ok(Self { http, rest_url })
    }

    /// `{rest_url}/{table}` with the given query pairs.
    pub(crate) fn table_url(&self, table: &str, params: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = self.rest_url.join(table)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let endpoint = url.path().to_owned();
        let resp = self.http.get(url).send().await?;
        read_json(resp, &endpoint).await
    }
}

fn rest_root(project_url: &Url) -> Result<Url, Error> {
    let mut base = project_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("rest/v1/")?)
}
