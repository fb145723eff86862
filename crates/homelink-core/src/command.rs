// ── Typed commands ──
//
// `LightCommand` is the typed front door for light control. Every
// command lowers to a `CommandEnvelope`; the envelope alone decides the
// transport and the optimistic cache write, so raw envelopes built by
// callers get the same treatment as typed ones.

use homelink_api::{ColorTemperature, CommandEnvelope, PowerState, Schedule};
use serde_json::Value;
use tracing::debug;

/// Command tags understood by devices.
pub mod tags {
    pub const BRIGHTNESS_SET: &str = "BRIGHTNESS_SET";
    pub const COLOR_SET: &str = "COLOR_SET";
    pub const TIMER_SET: &str = "TIMER_SET";
    pub const POWER_SET: &str = "POWER_SET";
    pub const ON: &str = "ON";
    pub const OFF: &str = "OFF";
    pub const STATUS_QUERY: &str = "STATUS_QUERY";
    pub const PING: &str = "PING";
}

/// A light control request.
#[derive(Debug, Clone, PartialEq)]
pub enum LightCommand {
    /// Brightness percentage, 0..=100.
    Brightness(u8),
    ColorTemperature(ColorTemperature),
    Power(PowerState),
    /// Switch to `action` at `hour:minute`.
    Timer {
        action: PowerState,
        hour: u8,
        minute: u8,
    },
    Custom(CommandEnvelope),
}

impl LightCommand {
    /// Brightness command, clamping to 0..=100.
    pub fn brightness(percent: i64) -> Self {
        let clamped = u8::try_from(percent.clamp(0, 100)).unwrap_or(100);
        Self::Brightness(clamped)
    }

    /// Lower to the envelope sent on the wire.
    pub fn envelope(&self) -> CommandEnvelope {
        match self {
            Self::Brightness(v) => CommandEnvelope::new(tags::BRIGHTNESS_SET).with_value(*v),
            Self::ColorTemperature(c) => {
                CommandEnvelope::new(tags::COLOR_SET).with_value(c.to_string())
            }
            Self::Power(PowerState::On) => CommandEnvelope::new(tags::ON),
            Self::Power(PowerState::Off) => CommandEnvelope::new(tags::OFF),
            Self::Timer {
                action,
                hour,
                minute,
            } => CommandEnvelope::new(tags::TIMER_SET).with_schedule(Schedule {
                action: Some(action.to_string()),
                hour: Some(*hour),
                minute: Some(*minute),
                ..Schedule::default()
            }),
            Self::Custom(envelope) => envelope.clone(),
        }
    }
}

/// Which transport carries a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `POST /devices/{id}/control` on the middleware.
    ControlPlane,
    /// Direct publish on the device's control topic.
    Broker,
}

/// Presence checks go straight to the broker; everything that changes
/// device state goes through the middleware.
pub fn route_for(envelope: &CommandEnvelope) -> Route {
    let tag = envelope.command.as_str();
    if tag.eq_ignore_ascii_case(tags::STATUS_QUERY) || tag.eq_ignore_ascii_case(tags::PING) {
        Route::Broker
    } else {
        Route::ControlPlane
    }
}

/// A cache write implied by a successfully dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimisticWrite {
    Brightness(u8),
    ColorTemperature(ColorTemperature),
    Power(PowerState),
}

impl OptimisticWrite {
    /// Derive the write from an envelope. Commands that do not set a
    /// light attribute (timers, presence checks, unknown tags) yield `None`.
    pub fn from_envelope(envelope: &CommandEnvelope) -> Option<Self> {
        let tag = envelope.command.to_ascii_uppercase();
        let value = envelope.value.as_ref();
        let write = match tag.as_str() {
            tags::BRIGHTNESS_SET => value.and_then(brightness_value).map(Self::Brightness),
            tags::COLOR_SET => value
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .map(Self::ColorTemperature),
            tags::ON => Some(Self::Power(PowerState::On)),
            tags::OFF => Some(Self::Power(PowerState::Off)),
            tags::POWER_SET => value
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .map(Self::Power),
            _ => None,
        };
        let sets_attribute = matches!(
            tag.as_str(),
            tags::BRIGHTNESS_SET | tags::COLOR_SET | tags::POWER_SET
        );
        if write.is_none() && sets_attribute {
            debug!(command = %envelope.command, "command value not usable for optimistic write");
        }
        write
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn brightness_value(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.round().clamp(0.0, 100.0) as u8)
}
