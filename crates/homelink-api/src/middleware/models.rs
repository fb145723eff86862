// Middleware response bodies.
//
// List fields are `Option` so a well-formed body lacking the list is
// distinguishable from a transport failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AggregateBucket, DeviceRecord, SensorReading};

/// `GET /devices`
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Option<Vec<DeviceRecord>>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `GET /sensor/latest` and `GET /sensor/history/raw`
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingsResponse {
    #[serde(default)]
    pub data: Option<Vec<SensorReading>>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// `GET /sensor/history/agg`
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateResponse {
    #[serde(default)]
    pub data: Option<Vec<AggregateBucket>>,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// `GET /sensor/summary`. Each kind is the latest-row list for its aliases.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub temperature: Option<Vec<SensorReading>>,
    #[serde(default)]
    pub humidity: Option<Vec<SensorReading>>,
    #[serde(default)]
    pub gas: Option<Vec<SensorReading>>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Acknowledgement for control, config, and alarm calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `POST /devices/{id}/config` body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ConfigRequest<'a> {
    pub config: &'a Value,
}
