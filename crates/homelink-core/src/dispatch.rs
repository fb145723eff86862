// ── Command dispatch ──
//
// Sends commands to devices. State-changing commands go through the
// middleware control plane; presence checks are published directly on
// the broker. Commands never fall back to the storage tier, and a
// failed command is not retried.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use homelink_api::middleware::models::CommandAck;
use homelink_api::{CommandEnvelope, DeviceId, MiddlewareClient, MqttConnector};

use crate::command::{LightCommand, OptimisticWrite, Route, route_for};
use crate::error::CoreError;
use crate::model::CachedDeviceState;
use crate::reconcile::Reconciler;

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub route: Route,
    /// Middleware acknowledgement; `None` for broker publishes.
    pub ack: Option<CommandAck>,
    /// Cached state after the optimistic write, if the command implied one.
    pub state: Option<CachedDeviceState>,
}

/// Delivers commands and applies their optimistic cache writes.
#[derive(Clone)]
pub struct CommandDispatcher {
    middleware: MiddlewareClient,
    broker: MqttConnector,
    reconciler: Arc<Reconciler>,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("middleware", &self.middleware.base_url().as_str())
            .finish_non_exhaustive()
    }
}

impl CommandDispatcher {
    pub fn new(
        middleware: MiddlewareClient,
        broker: MqttConnector,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            middleware,
            broker,
            reconciler,
        }
    }

    /// Deliver `envelope` to `device`.
    ///
    /// On success, a command that sets brightness, color temperature,
    /// or power is written to the cache immediately, before any device
    /// confirmation.
    pub async fn dispatch(
        &self,
        device: &DeviceId,
        envelope: &CommandEnvelope,
    ) -> Result<DispatchOutcome, CoreError> {
        if envelope.command.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "command tag must not be empty".into(),
            });
        }

        let route = route_for(envelope);
        debug!(device_id = %device, command = %envelope.command, ?route, "dispatching command");

        let ack = match route {
            Route::ControlPlane => Some(
                self.middleware
                    .control_device(device, envelope)
                    .await
                    .map_err(|e| CoreError::dispatch(device.as_str(), &envelope.command, &e))?,
            ),
            Route::Broker => {
                self.broker
                    .publish_control(device, envelope)
                    .await
                    .map_err(|e| broker_error(device, &envelope.command, e))?;
                None
            }
        };

        let state = match OptimisticWrite::from_envelope(envelope) {
            Some(write) => self.apply_optimistic(device, write).await,
            None => None,
        };

        info!(device_id = %device, command = %envelope.command, "command delivered");
        Ok(DispatchOutcome { route, ack, state })
    }

    /// Validate and deliver a typed light command.
    pub async fn send_light(
        &self,
        device: &DeviceId,
        command: &LightCommand,
    ) -> Result<DispatchOutcome, CoreError> {
        validate(command)?;
        self.dispatch(device, &command.envelope()).await
    }

    /// Push a configuration object to the device. No cache write.
    pub async fn configure(&self, device: &DeviceId, config: &Value) -> Result<CommandAck, CoreError> {
        if !config.is_object() {
            return Err(CoreError::ValidationFailed {
                message: "device config must be a JSON object".into(),
            });
        }
        self.middleware
            .configure_device(device, config)
            .await
            .map_err(|e| CoreError::dispatch(device.as_str(), "config", &e))
    }

    /// Acknowledge and silence the device's alarm.
    pub async fn close_alarm(&self, device: &DeviceId) -> Result<CommandAck, CoreError> {
        self.middleware
            .close_alarm(device)
            .await
            .map_err(|e| CoreError::dispatch(device.as_str(), "alarm_close", &e))
    }

    /// The cache may sit on disk, so the write runs on the blocking pool.
    /// The command is already delivered; a failed write only loses the
    /// optimistic state.
    async fn apply_optimistic(
        &self,
        device: &DeviceId,
        write: OptimisticWrite,
    ) -> Option<CachedDeviceState> {
        let reconciler = Arc::clone(&self.reconciler);
        let device = device.clone();
        match tokio::task::spawn_blocking(move || reconciler.apply_optimistic(&device, write)).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "optimistic cache write aborted");
                None
            }
        }
    }
}

fn broker_error(device: &DeviceId, command: &str, err: homelink_api::Error) -> CoreError {
    use homelink_api::Error as Api;
    match err {
        Api::MqttConnect(_) | Api::Tls(_) | Api::Shutdown | Api::Timeout { .. } => err.into(),
        other => CoreError::dispatch(device.as_str(), command, &other),
    }
}

fn validate(command: &LightCommand) -> Result<(), CoreError> {
    let problem = match command {
        LightCommand::Brightness(b) if *b > 100 => Some(format!("brightness {b} is outside 0..=100")),
        LightCommand::Timer { hour, minute, .. } if *hour > 23 || *minute > 59 => {
            Some(format!("timer time {hour:02}:{minute:02} is not a valid time of day"))
        }
        _ => None,
    };
    problem.map_or(Ok(()), |message| Err(CoreError::ValidationFailed { message }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use homelink_api::PowerState;

    use super::*;

    #[test]
    fn validation_rejects_out_of_range_values() {
        assert!(validate(&LightCommand::Brightness(101)).is_err());
        assert!(validate(&LightCommand::Brightness(100)).is_ok());
        assert!(
            validate(&LightCommand::Timer {
                action: PowerState::On,
                hour: 24,
                minute: 0
            })
            .is_err()
        );
        assert!(
            validate(&LightCommand::Timer {
                action: PowerState::Off,
                hour: 23,
                minute: 59
            })
            .is_ok()
        );
    }

    #[test]
    fn broker_connect_failures_stay_connection_errors() {
        let d: DeviceId = "lamp".parse().unwrap();
        let err = broker_error(&d, "PING", homelink_api::Error::MqttConnect("refused".into()));
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    }
}
