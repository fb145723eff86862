// ── Core error types ──
//
// Domain errors from homelink-core. Callers see which stage failed
// (connect, dispatch, query) rather than raw HTTP or MQTT details.
// The `From<homelink_api::Error>` impl gives the default mapping; call
// sites that know the stage use the `dispatch`/`query` constructors.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to broker at {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Command `{command}` for {device} failed: {reason}")]
    Dispatch {
        device: String,
        command: String,
        reason: String,
        /// HTTP status code (if the middleware answered).
        status: Option<u16>,
    },

    #[error("Query `{operation}` failed: {reason}")]
    Query { operation: String, reason: String },

    #[error("Could not interpret {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Infrastructure errors ────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("State store error: {message}")]
    Storage { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap a transport error raised while dispatching `command` to `device`.
    pub fn dispatch(device: &str, command: &str, err: &homelink_api::Error) -> Self {
        match err {
            homelink_api::Error::Timeout { timeout_secs } => Self::Timeout {
                timeout_secs: *timeout_secs,
            },
            other => Self::Dispatch {
                device: device.to_owned(),
                command: command.to_owned(),
                reason: other.to_string(),
                status: other.status(),
            },
        }
    }

    /// Wrap a transport error raised by the final tier of a read.
    pub fn query(operation: &str, err: &homelink_api::Error) -> Self {
        Self::Query {
            operation: operation.to_owned(),
            reason: err.to_string(),
        }
    }

    /// Returns `true` for failures a later attempt might not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::Dispatch { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<homelink_api::Error> for CoreError {
    fn from(err: homelink_api::Error) -> Self {
        use homelink_api::Error as Api;
        match err {
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::MqttConnect(reason) => CoreError::ConnectionFailed {
                host: String::new(),
                reason,
            },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                host: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Shutdown => CoreError::ConnectionFailed {
                host: String::new(),
                reason: "connector is shut down".into(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::InvalidCredential(msg) => CoreError::Config { message: msg },
            Api::Deserialization { message, body: _ } => CoreError::Parse {
                what: "response body".into(),
                reason: message,
            },
            Api::Wire(e) => CoreError::Parse {
                what: "device payload".into(),
                reason: e.to_string(),
            },
            Api::UnexpectedShape { endpoint, field } => CoreError::Parse {
                what: format!("response from {endpoint}"),
                reason: format!("missing `{field}`"),
            },
            ref e @ (Api::Transport(_) | Api::Status { .. } | Api::MqttClient(_)) => {
                CoreError::Query {
                    operation: "request".into(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl From<crate::store::StoreError> for CoreError {
    fn from(err: crate::store::StoreError) -> Self {
        CoreError::Storage {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_keeps_status() {
        let api = homelink_api::Error::Status {
            status: 404,
            endpoint: "/devices/x/control".into(),
            message: "Device not found".into(),
        };
        let err = CoreError::dispatch("x", "ON", &api);
        assert!(matches!(err, CoreError::Dispatch { status: Some(404), .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn dispatch_timeout_maps_to_timeout() {
        let api = homelink_api::Error::Timeout { timeout_secs: 30 };
        assert!(matches!(
            CoreError::dispatch("x", "ON", &api),
            CoreError::Timeout { timeout_secs: 30 }
        ));
    }

    #[test]
    fn connect_failures_are_transient() {
        let err: CoreError = homelink_api::Error::MqttConnect("refused".into()).into();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        assert!(err.is_transient());
    }
}
