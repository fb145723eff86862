// ── Wire payloads ──
//
// JSON bodies exchanged with devices: inbound status reports on
// `<ns>/<id>/in/status` and outbound command envelopes on
// `<ns>/<id>/out/control`. The same envelope is the body of the
// middleware's `POST /devices/{id}/control`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::debug;

/// Failure to interpret a payload. Callers log and drop; never fatal.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("status report carries no device id")]
    MissingDevice,

    #[error("invalid device id: {0}")]
    InvalidDevice(#[from] InvalidDeviceId),
}

// ── DeviceId ────────────────────────────────────────────────────────

/// Opaque device identifier. Used as topic segment and cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

/// A string that cannot name a device (empty, or contains a topic
/// separator or wildcard).
#[derive(Debug, Clone, Error)]
#[error("`{0}` is not a valid device id")]
pub struct InvalidDeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = InvalidDeviceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for DeviceId {
    type Error = InvalidDeviceId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '+', '#']) {
            return Err(InvalidDeviceId(s));
        }
        if trimmed.len() == s.len() {
            Ok(Self(s))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Light attributes ────────────────────────────────────────────────

/// Color temperature mode of a light.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ColorTemperature {
    #[default]
    Natural,
    Cool,
    Warm,
}

/// Power state of a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum PowerState {
    #[default]
    On,
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

// ── StatusReport ────────────────────────────────────────────────────

/// An unsolicited, possibly partial, report of a device's attributes.
///
/// Absent fields are `None` and must not overwrite anything downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub device_id: DeviceId,
    pub brightness: Option<u8>,
    pub color_temperature: Option<ColorTemperature>,
    pub power: Option<PowerState>,
    /// The decoded payload, unknown fields included.
    pub raw: Value,
}

impl StatusReport {
    /// A report carrying no attributes.
    pub fn empty(device_id: DeviceId) -> Self {
        Self {
            device_id,
            brightness: None,
            color_temperature: None,
            power: None,
            raw: Value::Object(Map::new()),
        }
    }

    /// Decode a status payload.
    ///
    /// The `device_id` field wins; `topic_device` (the id segment of the
    /// topic the payload arrived on) is used when the field is missing.
    /// Unrecognized or malformed attribute values decode as absent.
    pub fn from_payload(payload: &[u8], topic_device: Option<&DeviceId>) -> Result<Self, WireError> {
        let raw: Value = serde_json::from_slice(payload)?;
        let obj = raw.as_object().ok_or(WireError::NotAnObject)?;

        let device_id = match obj.get("device_id") {
            Some(Value::String(s)) => s.parse::<DeviceId>()?,
            Some(Value::Number(n)) => n.to_string().parse::<DeviceId>()?,
            _ => topic_device.cloned().ok_or(WireError::MissingDevice)?,
        };
        if let Some(topic_id) = topic_device.filter(|t| **t != device_id) {
            debug!(topic = %topic_id, payload = %device_id, "status device id differs from topic");
        }

        let brightness = obj.get("brightness_current").and_then(brightness_from);
        let color_temperature = obj
            .get("color_temp_current")
            .and_then(|v| enum_from::<ColorTemperature>(v, "color_temp_current"));
        let power = obj.get("power_current").and_then(power_from);

        Ok(Self {
            device_id,
            brightness,
            color_temperature,
            power,
            raw,
        })
    }

    /// `true` if the report carries at least one recognized attribute.
    pub fn has_attributes(&self) -> bool {
        self.brightness.is_some() || self.color_temperature.is_some() || self.power.is_some()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn brightness_from(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

fn enum_from<T: FromStr>(value: &Value, field: &str) -> Option<T> {
    let s = value.as_str()?;
    let parsed = s.trim().parse::<T>().ok();
    if parsed.is_none() {
        debug!(field, value = s, "ignoring unrecognized attribute value");
    }
    parsed
}

fn power_from(value: &Value) -> Option<PowerState> {
    match value {
        Value::Bool(true) => Some(PowerState::On),
        Value::Bool(false) => Some(PowerState::Off),
        other => enum_from(other, "power_current"),
    }
}

// ── CommandEnvelope ─────────────────────────────────────────────────

/// Optional schedule fields carried by timer-style commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A command for a device: a tag, an optional polymorphic value, and
/// optional schedule fields flattened into the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub schedule: Schedule,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            value: None,
            schedule: Schedule::default(),
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Compact JSON encoding for publication.
    pub fn to_payload(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an envelope seen on a control topic.
    pub fn from_payload(payload: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
