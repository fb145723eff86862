use thiserror::Error;

/// Top-level error type for the `homelink-api` crate.
///
/// Covers every failure mode across the three transports: the middleware
/// control plane, the storage REST tier, and the MQTT broker connection.
/// `homelink-core` maps these into the domain taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or connection attempt timed out.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A credential cannot be sent (e.g. not a valid header value).
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success HTTP status from the middleware or storage tier.
    #[error("HTTP {status} from {endpoint}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// The response parsed but lacked the field the caller needs
    /// (e.g. a `/devices` body without a `devices` list).
    #[error("Unexpected response shape from {endpoint}: missing `{field}`")]
    UnexpectedShape { endpoint: String, field: &'static str },

    // ── MQTT ────────────────────────────────────────────────────────
    /// The broker could not be reached or rejected the connection.
    #[error("MQTT connection failed: {0}")]
    MqttConnect(String),

    /// A client request (publish, subscribe) could not be queued.
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    /// The connector was shut down and no longer accepts requests.
    #[error("MQTT connector is shut down")]
    Shutdown,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A device payload could not be encoded or decoded.
    #[error("Payload error: {0}")]
    Wire(#[from] crate::mqtt::wire::WireError),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::MqttConnect(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Status { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
