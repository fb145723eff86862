use serde::Serialize;

use homelink_api::{SensorKind, SensorReading};

/// Which path produced a [`SensorSummaryReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    /// The middleware's aggregate endpoint.
    Aggregate,
    /// Independent per-kind queries after the aggregate endpoint failed.
    PerKind,
}

/// A sensor kind whose per-kind query failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindFailure {
    pub kind: SensorKind,
    pub reason: String,
}

/// Latest readings for temperature, humidity, and gas.
///
/// Kinds that could not be fetched are `None` and listed in `failures`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummaryReport {
    pub temperature: Option<Vec<SensorReading>>,
    pub humidity: Option<Vec<SensorReading>>,
    pub gas: Option<Vec<SensorReading>>,
    pub failures: Vec<KindFailure>,
    pub source: SummarySource,
}

impl SensorSummaryReport {
    pub(crate) fn empty(source: SummarySource) -> Self {
        Self {
            temperature: None,
            humidity: None,
            gas: None,
            failures: Vec::new(),
            source,
        }
    }

    pub fn get(&self, kind: SensorKind) -> Option<&[SensorReading]> {
        match kind {
            SensorKind::Temperature => self.temperature.as_deref(),
            SensorKind::Humidity => self.humidity.as_deref(),
            SensorKind::Gas => self.gas.as_deref(),
        }
    }

    pub(crate) fn set(&mut self, kind: SensorKind, readings: Vec<SensorReading>) {
        let slot = match kind {
            SensorKind::Temperature => &mut self.temperature,
            SensorKind::Humidity => &mut self.humidity,
            SensorKind::Gas => &mut self.gas,
        };
        *slot = Some(readings);
    }

    /// Newest value for `kind`, if any row came back.
    pub fn latest_value(&self, kind: SensorKind) -> Option<f64> {
        self.get(kind)?.first().map(|r| r.value)
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
