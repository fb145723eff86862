// Device endpoints: listing and the three command calls.

use serde_json::Value;

use super::MiddlewareClient;
use super::models::{CommandAck, ConfigRequest, DevicesResponse};
use crate::error::Error;
use crate::mqtt::wire::{CommandEnvelope, DeviceId};

impl MiddlewareClient {
    /// `GET /devices`
    pub async fn list_devices(&self) -> Result<DevicesResponse, Error> {
        let url = self.url(&["devices"])?;
        self.get(url).await
    }

    /// `POST /devices/{id}/control` with the envelope as body.
    pub async fn control_device(
        &self,
        device: &DeviceId,
        envelope: &CommandEnvelope,
    ) -> Result<CommandAck, Error> {
        let url = self.url(&["devices", device.as_str(), "control"])?;
        self.post(url, envelope).await
    }

    /// `POST /devices/{id}/config` with body `{"config": ...}`.
    pub async fn configure_device(
        &self,
        device: &DeviceId,
        config: &Value,
    ) -> Result<CommandAck, Error> {
        let url = self.url(&["devices", device.as_str(), "config"])?;
        self.post(url, &ConfigRequest { config }).await
    }

    /// `POST /alarm/{id}/close`
    pub async fn close_alarm(&self, device: &DeviceId) -> Result<CommandAck, Error> {
        let url = self.url(&["alarm", device.as_str(), "close"])?;
        self.post(url, &serde_json::json!({})).await
    }
}
