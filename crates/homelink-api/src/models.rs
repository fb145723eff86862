// Row types shared by the middleware and the storage tier.
//
// Both tiers serve rows straight out of the same `devices` and
// `sensor_data` tables, so one set of types covers both. Fields are
// lenient: ids and values arrive as numbers or strings depending on
// which tier answered.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A row of the `devices` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "device_type")]
    pub device_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, alias = "room")]
    pub location: Option<String>,
    /// Columns not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceRecord {
    /// The id devices use on the broker: `device_id` when set, else `id`.
    pub fn broker_id(&self) -> &str {
        self.device_id.as_deref().unwrap_or(&self.id)
    }
}

/// A row of the `sensor_data` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default)]
    pub device_id: Option<String>,
    pub sensor_type: String,
    #[serde(deserialize_with = "f64_lenient")]
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub timestamp: String,
}

/// One bucket of an aggregated history query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub bucket: String,
    pub avg: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub count: Option<u64>,
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn f64_lenient<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    match Value::deserialize(de)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid numeric value `{s}`: {e}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected numeric value, got {other}"
        ))),
    }
}
