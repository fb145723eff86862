//! Sensor kinds and the alias sets the backend stores them under.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The sensor kinds the summary view reports on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Gas,
}

impl SensorKind {
    /// Every `sensor_type` value stored for this kind.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Temperature => &["temperature", "温度"],
            Self::Humidity => &["humidity", "湿度"],
            Self::Gas => &["gas", "可燃气体", "煤气浓度"],
        }
    }
}

/// Resolve a free-form sensor type to the values stored for it.
/// Unknown types resolve to themselves.
pub fn sensor_aliases(sensor_type: &str) -> Vec<String> {
    match sensor_type.parse::<SensorKind>() {
        Ok(kind) => kind.aliases().iter().map(|s| (*s).to_owned()).collect(),
        Err(_) => vec![sensor_type.to_owned()],
    }
}
