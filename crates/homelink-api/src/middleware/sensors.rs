// Sensor read endpoints.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::MiddlewareClient;
use super::models::{AggregateResponse, ReadingsResponse, SummaryResponse};
use crate::error::Error;

/// Sort order for raw history.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parameters for `GET /sensor/history/raw`. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuery {
    pub device_id: Option<String>,
    pub sensor_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub order: SortOrder,
    pub limit: Option<u32>,
}

/// Parameters for `GET /sensor/history/agg`. Unset fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggQuery {
    pub device_id: Option<String>,
    pub sensor_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Bucket width such as `15m`, `1h`, `1d`.
    pub bucket: String,
}

impl Default for AggQuery {
    fn default() -> Self {
        Self {
            device_id: None,
            sensor_type: None,
            from: None,
            to: None,
            bucket: "1h".into(),
        }
    }
}

impl MiddlewareClient {
    /// `GET /sensor/latest?sensor_type=`
    pub async fn latest_sensor(&self, sensor_type: &str) -> Result<ReadingsResponse, Error> {
        let mut url = self.url(&["sensor", "latest"])?;
        url.query_pairs_mut().append_pair("sensor_type", sensor_type);
        self.get(url).await
    }

    /// `GET /sensor/summary`
    pub async fn sensor_summary(&self) -> Result<SummaryResponse, Error> {
        let url = self.url(&["sensor", "summary"])?;
        self.get(url).await
    }

    /// `GET /sensor/history/raw`
    pub async fn sensor_history_raw(&self, query: &RawQuery) -> Result<ReadingsResponse, Error> {
        let mut url = self.url(&["sensor", "history", "raw"])?;
        {
            let mut pairs = url.query_pairs_mut();
            append_opt(&mut pairs, "device_id", query.device_id.as_deref());
            append_opt(&mut pairs, "sensor_type", query.sensor_type.as_deref());
            append_opt(&mut pairs, "from", query.from.as_deref());
            append_opt(&mut pairs, "to", query.to.as_deref());
            pairs.append_pair("order", query.order.as_ref());
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        self.get(url).await
    }

    /// `GET /sensor/history/agg`
    pub async fn sensor_history_agg(&self, query: &AggQuery) -> Result<AggregateResponse, Error> {
        let mut url = self.url(&["sensor", "history", "agg"])?;
        {
            let mut pairs = url.query_pairs_mut();
            append_opt(&mut pairs, "device_id", query.device_id.as_deref());
            append_opt(&mut pairs, "sensor_type", query.sensor_type.as_deref());
            append_opt(&mut pairs, "from", query.from.as_deref());
            append_opt(&mut pairs, "to", query.to.as_deref());
            pairs.append_pair("bucket", &query.bucket);
        }
        self.get(url).await
    }
}

fn append_opt(
    pairs: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>,
    key: &str,
    value: Option<&str>,
) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        pairs.append_pair(key, v);
    }
}
