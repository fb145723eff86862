// Broker transport: pinned TLS, topic layout, payload codecs, and the
// session connector.

pub mod connector;
pub mod tls;
pub mod topics;
mod tunnel;
pub mod wire;

pub use connector::{BrokerOptions, ConnectionState, Inbound, MqttConnector};
pub use topics::{TopicKind, TopicRouter};
pub use wire::{ColorTemperature, CommandEnvelope, DeviceId, PowerState, Schedule, StatusReport};
