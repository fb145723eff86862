// Domain types. Wire and row types come from homelink-api unchanged;
// this module adds the cached light state and the summary report.

mod device;
mod sensor;

pub use device::{CachedDeviceState, DEFAULT_BRIGHTNESS};
pub use sensor::{KindFailure, SensorSummaryReport, SummarySource};

pub use homelink_api::middleware::models::CommandAck;
pub use homelink_api::middleware::{AggQuery, RawQuery, SortOrder};
pub use homelink_api::{
    AggregateBucket, ColorTemperature, CommandEnvelope, DeviceId, DeviceRecord, PowerState,
    Schedule, SensorKind, SensorReading, StatusReport,
};
