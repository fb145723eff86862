// ── State reconciliation ──
//
// Merges status reports and optimistic writes into the light state
// cache, then republishes the merged state to whoever is watching that
// device. Writes are last-write-wins: a report overrides an earlier
// optimistic write for the attributes it carries, and a later dispatch
// overrides an earlier report.

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

use homelink_api::{DeviceId, StatusReport};

use crate::command::OptimisticWrite;
use crate::listeners::StatusListener;
use crate::model::CachedDeviceState;
use crate::store::LightStateCache;
use crate::stream::DeviceWatch;

pub struct Reconciler {
    cache: LightStateCache,
    watchers: DashMap<DeviceId, watch::Sender<CachedDeviceState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("watched", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(cache: LightStateCache) -> Self {
        Self {
            cache,
            watchers: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &LightStateCache {
        &self.cache
    }

    /// Persist the attributes present in `report` and notify watchers of
    /// that device. Unwatched devices are cached silently.
    pub fn merge_report(&self, report: &StatusReport) -> CachedDeviceState {
        if !report.has_attributes() {
            trace!(device_id = %report.device_id, "report carries no light attributes");
            return self.cache.snapshot(&report.device_id);
        }
        let state = self.cache.merge_report(report);
        self.publish(&report.device_id, state);
        state
    }

    /// Record the expected effect of a dispatched command.
    pub fn apply_optimistic(&self, device: &DeviceId, write: OptimisticWrite) -> CachedDeviceState {
        match write {
            OptimisticWrite::Brightness(b) => self.cache.set_brightness(device, b),
            OptimisticWrite::ColorTemperature(c) => self.cache.set_color_temperature(device, c),
            OptimisticWrite::Power(p) => self.cache.set_power(device, p),
        }
        let state = self.cache.snapshot(device);
        self.publish(device, state);
        state
    }

    /// Start watching `device`. The handle's current value is the cached
    /// state at call time.
    pub fn watch(&self, device: &DeviceId) -> DeviceWatch {
        let snapshot = self.cache.snapshot(device);
        let rx = self
            .watchers
            .entry(device.clone())
            .and_modify(|tx| {
                tx.send_if_modified(|cur| replace_if_changed(cur, snapshot));
            })
            .or_insert_with(|| watch::channel(snapshot).0)
            .subscribe();
        DeviceWatch::new(device.clone(), rx)
    }

    /// Number of devices with at least one live watcher.
    pub fn watched(&self) -> usize {
        self.watchers
            .iter()
            .filter(|e| e.value().receiver_count() > 0)
            .count()
    }

    fn publish(&self, device: &DeviceId, state: CachedDeviceState) {
        let abandoned = match self.watchers.get(device) {
            Some(tx) if tx.receiver_count() > 0 => {
                if tx.send_if_modified(|cur| replace_if_changed(cur, state)) {
                    trace!(device_id = %device, "republished device state");
                }
                false
            }
            Some(_) => true,
            None => false,
        };
        if abandoned {
            self.watchers
                .remove_if(device, |_, tx| tx.receiver_count() == 0);
        }
    }
}

fn replace_if_changed(cur: &mut CachedDeviceState, next: CachedDeviceState) -> bool {
    if *cur == next {
        false
    } else {
        *cur = next;
        true
    }
}

impl StatusListener for Reconciler {
    fn on_status(&self, report: &StatusReport) {
        self.merge_report(report);
    }
}
