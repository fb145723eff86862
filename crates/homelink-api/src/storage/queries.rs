// Table queries used as the fallback read tier.

use super::StorageClient;
use crate::error::Error;
use crate::models::{DeviceRecord, SensorReading};

impl StorageClient {
    /// `GET devices?select=*`
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.table_url("devices", &[("select", "*")])?;
        self.get(url).await
    }

    /// `GET devices?id=eq.{id}&select=*`. `None` when no row matches.
    pub async fn get_device(&self, id: &str) -> Result<Option<DeviceRecord>, Error> {
        let filter = format!("eq.{id}");
        let url = self.table_url("devices", &[("id", filter.as_str()), ("select", "*")])?;
        let rows: Vec<DeviceRecord> = self.get(url).await?;
        Ok(rows.into_iter().next())
    }

    /// Newest `sensor_data` row whose `sensor_type` is any of `types`.
    pub async fn latest_by_types(&self, types: &[String]) -> Result<Vec<SensorReading>, Error> {
        let filter = format!("in.({})", types.join(","));
        let url = self.table_url(
            "sensor_data",
            &[
                ("sensor_type", filter.as_str()),
                ("order", "timestamp.desc"),
                ("limit", "1"),
            ],
        )?;
        self.get(url).await
    }
}
