use serde::{Deserialize, Serialize};

use homelink_api::{ColorTemperature, PowerState, StatusReport};

pub const DEFAULT_BRIGHTNESS: u8 = 70;

/// Last known (or last requested) attributes of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachedDeviceState {
    pub brightness: u8,
    pub color_temperature: ColorTemperature,
    pub power: PowerState,
}

impl Default for CachedDeviceState {
    fn default() -> Self {
        Self {
            brightness: DEFAULT_BRIGHTNESS,
            color_temperature: ColorTemperature::Natural,
            power: PowerState::On,
        }
    }
}

impl CachedDeviceState {
    /// Overwrite the attributes present in `report`, leaving the rest.
    /// Returns `true` if anything changed.
    pub fn merge(&mut self, report: &StatusReport) -> bool {
        let before = *self;
        if let Some(b) = report.brightness {
            self.brightness = b.min(100);
        }
        if let Some(c) = report.color_temperature {
            self.color_temperature = c;
        }
        if let Some(p) = report.power {
            self.power = p;
        }
        *self != before
    }
}
