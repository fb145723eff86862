// homelink-api: Async transports for the homelink device hub
// (MQTT over pinned TLS, middleware REST, storage REST).

pub mod error;
pub mod middleware;
pub mod models;
pub mod mqtt;
pub mod sensor;
pub mod storage;
pub mod transport;

pub use error::Error;
pub use middleware::MiddlewareClient;
pub use models::{AggregateBucket, DeviceRecord, SensorReading};
pub use mqtt::{
    BrokerOptions, ColorTemperature, CommandEnvelope, ConnectionState, DeviceId, Inbound,
    MqttConnector, PowerState, Schedule, StatusReport, TopicRouter,
};
pub use sensor::{SensorKind, sensor_aliases};
pub use storage::StorageClient;
pub use transport::{TlsMode, TransportConfig};
