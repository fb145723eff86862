// homelink-core: Command dispatch, status fan-out, resilient reads, and
// the reconciled light state cache, on top of homelink-api.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod listeners;
pub mod model;
pub mod query;
pub mod reconcile;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{LightCommand, OptimisticWrite, Route};
pub use config::{BrokerConfig, CacheConfig, HttpConfig, HubConfig, StorageConfig};
pub use dispatch::{CommandDispatcher, DispatchOutcome};
pub use error::CoreError;
pub use hub::Hub;
pub use listeners::{ListenerId, ListenerRegistry, StatusListener};
pub use query::{ResilientQueryClient, fetch_with_fallback};
pub use reconcile::Reconciler;
pub use store::{KeyValueStore, LightStateCache, MemoryStore, RedbStore, StoreError};
pub use stream::{DeviceWatch, DeviceWatchStream};

pub use homelink_api::ConnectionState;
pub use model::{
    AggQuery, AggregateBucket, CachedDeviceState, ColorTemperature, CommandEnvelope, DeviceId,
    DeviceRecord, PowerState, RawQuery, Schedule, SensorKind, SensorReading, SensorSummaryReport,
    SortOrder, StatusReport,
};
