use std::sync::Arc;

use tracing::warn;

use homelink_api::{ColorTemperature, DeviceId, PowerState, StatusReport};

use super::{KeyValueStore, StoreError};
use crate::model::{CachedDeviceState, DEFAULT_BRIGHTNESS};

/// Per-device light attributes over a [`KeyValueStore`].
///
/// Reads never fail: a missing, unreadable, or unparseable value yields
/// the default for that attribute. Write failures are logged and
/// swallowed so a broken disk never blocks command dispatch.
#[derive(Clone)]
pub struct LightStateCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LightStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightStateCache").finish_non_exhaustive()
    }
}

fn key(device: &DeviceId, attribute: &str) -> String {
    format!("light_{device}_{attribute}")
}

impl LightStateCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(super::MemoryStore::new()))
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn brightness(&self, device: &DeviceId) -> u8 {
        let raw = logged(self.store.get_int(&key(device, "brightness")), device, "brightness");
        raw.map_or(DEFAULT_BRIGHTNESS, |v| {
            u8::try_from(v.clamp(0, 100)).unwrap_or(DEFAULT_BRIGHTNESS)
        })
    }

    pub fn color_temperature(&self, device: &DeviceId) -> ColorTemperature {
        logged(self.store.get_str(&key(device, "colorTemp")), device, "colorTemp")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn power(&self, device: &DeviceId) -> PowerState {
        logged(self.store.get_str(&key(device, "power")), device, "power")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// All three attributes, each falling back independently.
    pub fn snapshot(&self, device: &DeviceId) -> CachedDeviceState {
        CachedDeviceState {
            brightness: self.brightness(device),
            color_temperature: self.color_temperature(device),
            power: self.power(device),
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub fn set_brightness(&self, device: &DeviceId, brightness: u8) {
        let value = i64::from(brightness.min(100));
        report_write(
            self.store.put_int(&key(device, "brightness"), value),
            device,
            "brightness",
        );
    }

    pub fn set_color_temperature(&self, device: &DeviceId, color: ColorTemperature) {
        report_write(
            self.store.put_str(&key(device, "colorTemp"), color.as_ref()),
            device,
            "colorTemp",
        );
    }

    pub fn set_power(&self, device: &DeviceId, power: PowerState) {
        report_write(
            self.store.put_str(&key(device, "power"), power.as_ref()),
            device,
            "power",
        );
    }

    /// Merge `report` over the cached state, persist the attributes it
    /// carries, and return the result. A report that changes nothing
    /// writes nothing.
    pub fn merge_report(&self, report: &StatusReport) -> CachedDeviceState {
        let device = &report.device_id;
        let mut state = self.snapshot(device);
        if !state.merge(report) {
            return state;
        }
        if report.brightness.is_some() {
            self.set_brightness(device, state.brightness);
        }
        if report.color_temperature.is_some() {
            self.set_color_temperature(device, state.color_temperature);
        }
        if report.power.is_some() {
            self.set_power(device, state.power);
        }
        state
    }
}

fn logged<T>(result: Result<Option<T>, StoreError>, device: &DeviceId, attribute: &str) -> Option<T> {
    result.unwrap_or_else(|e| {
        warn!(device = %device, attribute, error = %e, "state read failed, using default");
        None
    })
}

fn report_write(result: Result<(), StoreError>, device: &DeviceId, attribute: &str) {
    if let Err(e) = result {
        warn!(device = %device, attribute, error = %e, "state write failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::{MemoryStore, RedbStore};

    fn dev(id: &str) -> DeviceId {
        id.parse().unwrap()
    }

    #[test]
    fn unknown_device_reads_defaults() {
        let cache = LightStateCache::in_memory();
        assert_eq!(cache.snapshot(&dev("nobody")), CachedDeviceState::default());
    }

    #[test]
    fn uses_documented_key_layout() {
        let store = Arc::new(MemoryStore::new());
        let cache = LightStateCache::new(store.clone());
        let d = dev("lamp-1");
        cache.set_brightness(&d, 45);
        cache.set_color_temperature(&d, ColorTemperature::Warm);
        cache.set_power(&d, PowerState::Off);

        assert_eq!(store.get_int("light_lamp-1_brightness").unwrap(), Some(45));
        assert_eq!(store.get_str("light_lamp-1_colorTemp").unwrap().as_deref(), Some("warm"));
        assert_eq!(store.get_str("light_lamp-1_power").unwrap().as_deref(), Some("OFF"));
    }

    #[test]
    fn garbage_values_fall_back_per_attribute() {
        let store = Arc::new(MemoryStore::new());
        store.put_int("light_x_brightness", 900).unwrap();
        store.put_str("light_x_colorTemp", "sunset").unwrap();
        store.put_str("light_x_power", "off").unwrap();
        let cache = LightStateCache::new(store);

        let s = cache.snapshot(&dev("x"));
        assert_eq!(s.brightness, 100);
        assert_eq!(s.color_temperature, ColorTemperature::Natural);
        assert_eq!(s.power, PowerState::Off);
    }

    #[test]
    fn merge_report_keeps_absent_attributes() {
        let cache = LightStateCache::in_memory();
        let d = dev("lamp");
        cache.set_brightness(&d, 45);
        cache.set_color_temperature(&d, ColorTemperature::Cool);

        let mut report = StatusReport::empty(d.clone());
        report.brightness = Some(50);
        let merged = cache.merge_report(&report);

        assert_eq!(merged.brightness, 50);
        assert_eq!(merged.color_temperature, ColorTemperature::Cool);
        assert_eq!(merged.power, PowerState::On);
    }

    #[test]
    fn merging_a_report_twice_equals_merging_once() {
        let d = dev("lamp");
        let reports = [
            (Some(10), None, Some(PowerState::Off)),
            (None, Some(ColorTemperature::Cool), None),
            (None, None, None),
            (Some(100), Some(ColorTemperature::Natural), Some(PowerState::On)),
        ];
        for (brightness, color, power) in reports {
            let cache = LightStateCache::in_memory();
            cache.set_brightness(&d, 45);
            let mut report = StatusReport::empty(d.clone());
            report.brightness = brightness;
            report.color_temperature = color;
            report.power = power;

            let once = cache.merge_report(&report);
            let twice = cache.merge_report(&report);
            assert_eq!(twice, once);
            assert_eq!(cache.snapshot(&d), once);
        }
    }

    #[test]
    fn unchanged_report_skips_the_write() {
        let store = Arc::new(MemoryStore::new());
        let cache = LightStateCache::new(store.clone());
        let mut report = StatusReport::empty(dev("lamp"));
        report.power = Some(PowerState::On);

        assert_eq!(cache.merge_report(&report), CachedDeviceState::default());
        assert_eq!(store.get_str("light_lamp_power").unwrap(), None);
    }

    #[test]
    fn redb_backed_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        let d = dev("lamp");
        {
            let cache = LightStateCache::new(Arc::new(RedbStore::open(&path).unwrap()));
            cache.set_brightness(&d, 12);
        }
        let cache = LightStateCache::new(Arc::new(RedbStore::open(&path).unwrap()));
        assert_eq!(cache.brightness(&d), 12);
    }
}
