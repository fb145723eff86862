// ── Resilient reads ──
//
// Device and sensor reads try the middleware first and fall back to the
// storage REST tier when the middleware fails or answers without the
// expected data. History queries have a single tier.

use std::future::Future;

use strum::IntoEnumIterator;
use tracing::{debug, warn};

use homelink_api::middleware::{AggQuery, RawQuery};
use homelink_api::{
    AggregateBucket, DeviceRecord, MiddlewareClient, SensorKind, SensorReading, StorageClient,
    sensor_aliases,
};

use crate::error::CoreError;
use crate::model::{KindFailure, SensorSummaryReport, SummarySource};

/// Largest `limit` the raw history endpoint accepts.
pub const MAX_HISTORY_LIMIT: u32 = 10_000;

/// Run `primary`; if it fails, or `accept` rejects its value, run
/// `secondary` and return its result unchanged.
///
/// `secondary` is a future that has not been polled, so it issues no
/// request unless the primary tier is unusable. With no secondary tier
/// the primary's failure is returned.
pub async fn fetch_with_fallback<P, T, FP, FS>(
    operation: &str,
    primary: FP,
    accept: impl FnOnce(P) -> Option<T>,
    secondary: Option<FS>,
) -> Result<T, CoreError>
where
    FP: Future<Output = Result<P, homelink_api::Error>>,
    FS: Future<Output = Result<T, homelink_api::Error>>,
{
    let primary_error = match primary.await {
        Ok(value) => match accept(value) {
            Some(accepted) => return Ok(accepted),
            None => {
                debug!(operation, "primary tier answered without usable data");
                None
            }
        },
        Err(e) => {
            warn!(operation, error = %e, "primary tier failed");
            Some(e)
        }
    };

    let Some(secondary) = secondary else {
        return Err(match primary_error {
            Some(e) => CoreError::query(operation, &e),
            None => CoreError::Query {
                operation: operation.to_owned(),
                reason: "response lacked the expected data and no fallback tier is configured"
                    .into(),
            },
        });
    };

    debug!(operation, "querying fallback tier");
    secondary
        .await
        .map_err(|e| CoreError::query(operation, &e))
}

/// Read-only client over the middleware and the optional storage tier.
#[derive(Clone)]
pub struct ResilientQueryClient {
    middleware: MiddlewareClient,
    storage: Option<StorageClient>,
}

impl std::fmt::Debug for ResilientQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientQueryClient")
            .field("middleware", &self.middleware.base_url().as_str())
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

impl ResilientQueryClient {
    pub fn new(middleware: MiddlewareClient, storage: Option<StorageClient>) -> Self {
        Self {
            middleware,
            storage,
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.storage.is_some()
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// All devices. A middleware body without a `devices` list counts as
    /// a failure and triggers the fallback.
    pub async fn get_devices(&self) -> Result<Vec<DeviceRecord>, CoreError> {
        fetch_with_fallback(
            "get_devices",
            self.middleware.list_devices(),
            |resp| resp.devices,
            self.storage.as_ref().map(StorageClient::list_devices),
        )
        .await
    }

    /// One device, matched on `id` or `device_id`. `Ok(None)` when the
    /// answering tier has no such device.
    pub async fn get_device(&self, id: &str) -> Result<Option<DeviceRecord>, CoreError> {
        fetch_with_fallback(
            "get_device",
            self.middleware.list_devices(),
            |resp| {
                resp.devices
                    .map(|list| list.into_iter().find(|d| d.id == id || d.broker_id() == id))
            },
            self.storage.as_ref().map(|s| s.get_device(id)),
        )
        .await
    }

    // ── Sensors ──────────────────────────────────────────────────────

    /// Newest reading for `sensor_type`. An empty middleware answer is
    /// retried against storage using the type's alias set.
    pub async fn latest_sensor_value(
        &self,
        sensor_type: &str,
    ) -> Result<Option<SensorReading>, CoreError> {
        let aliases = sensor_aliases(sensor_type);
        fetch_with_fallback(
            "latest_sensor_value",
            self.middleware.latest_sensor(sensor_type),
            |resp| resp.data.and_then(|rows| rows.into_iter().next()).map(Some),
            self.storage.as_ref().map(|s| async move {
                let rows = s.latest_by_types(&aliases).await?;
                Ok::<_, homelink_api::Error>(rows.into_iter().next())
            }),
        )
        .await
    }

    /// Latest temperature, humidity, and gas.
    ///
    /// Uses the aggregate endpoint when it answers with at least one
    /// kind; otherwise queries each kind independently and reports the
    /// kinds that failed. Fails only when every kind failed.
    pub async fn sensor_summary(&self) -> Result<SensorSummaryReport, CoreError> {
        match self.middleware.sensor_summary().await {
            Ok(resp)
                if resp.temperature.is_some() || resp.humidity.is_some() || resp.gas.is_some() =>
            {
                return Ok(SensorSummaryReport {
                    temperature: resp.temperature,
                    humidity: resp.humidity,
                    gas: resp.gas,
                    failures: Vec::new(),
                    source: SummarySource::Aggregate,
                });
            }
            Ok(_) => debug!("summary endpoint returned no sensor kinds"),
            Err(e) => warn!(error = %e, "summary endpoint failed, querying per kind"),
        }

        let (temperature, humidity, gas) = tokio::join!(
            self.latest_sensor_value(SensorKind::Temperature.as_ref()),
            self.latest_sensor_value(SensorKind::Humidity.as_ref()),
            self.latest_sensor_value(SensorKind::Gas.as_ref()),
        );

        let mut report = SensorSummaryReport::empty(SummarySource::PerKind);
        let mut last_error = None;
        for (kind, result) in SensorKind::iter().zip([temperature, humidity, gas]) {
            match result {
                Ok(reading) => report.set(kind, reading.into_iter().collect()),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "sensor kind unavailable");
                    report.failures.push(KindFailure {
                        kind,
                        reason: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if report.failures.len() == SensorKind::iter().len() => Err(e),
            _ => Ok(report),
        }
    }

    // ── History (single tier) ────────────────────────────────────────

    pub async fn sensor_history_raw(&self, query: &RawQuery) -> Result<Vec<SensorReading>, CoreError> {
        if let Some(limit) = query.limit.filter(|l| *l == 0 || *l > MAX_HISTORY_LIMIT) {
            return Err(CoreError::ValidationFailed {
                message: format!("limit {limit} is outside 1..={MAX_HISTORY_LIMIT}"),
            });
        }
        let resp = self
            .middleware
            .sensor_history_raw(query)
            .await
            .map_err(|e| CoreError::query("sensor_history_raw", &e))?;
        Ok(resp.data.unwrap_or_default())
    }

    pub async fn sensor_history_agg(
        &self,
        query: &AggQuery,
    ) -> Result<Vec<AggregateBucket>, CoreError> {
        if query.bucket.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "bucket must not be empty".into(),
            });
        }
        let resp = self
            .middleware
            .sensor_history_agg(query)
            .await
            .map_err(|e| CoreError::query("sensor_history_agg", &e))?;
        Ok(resp.data.unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::{Ready, ready};

    use super::*;

    type Tier<T> = Ready<Result<T, homelink_api::Error>>;

    fn failing<T>() -> Tier<T> {
        ready(Err(homelink_api::Error::Timeout { timeout_secs: 30 }))
    }

    #[tokio::test]
    async fn accepted_primary_short_circuits() {
        let out = fetch_with_fallback(
            "t",
            ready(Ok(Some(vec![1, 2, 3]))),
            |v: Option<Vec<i32>>| v,
            Some(failing::<Vec<i32>>()),
        )
        .await
        .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rejected_primary_uses_secondary_unchanged() {
        let out = fetch_with_fallback(
            "t",
            ready(Ok(None)),
            |v: Option<Vec<i32>>| v,
            Some(ready(Ok(Vec::new()))),
        )
        .await
        .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn double_failure_reports_second_tier() {
        let err = fetch_with_fallback(
            "t",
            failing::<Option<i32>>(),
            |v| v,
            Some(ready(Err(homelink_api::Error::Status {
                status: 401,
                endpoint: "/rest/v1/devices".into(),
                message: "JWT expired".into(),
            }))),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("JWT expired"), "{err}");
    }

    #[tokio::test]
    async fn missing_secondary_reports_primary() {
        let err = fetch_with_fallback("t", failing::<Option<i32>>(), |v| v, None::<Tier<i32>>)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Query { .. }));
        assert!(err.to_string().contains("30s"), "{err}");
    }
}
