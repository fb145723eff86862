//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use homelink_config::ConfigError;
use homelink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to the broker at {host}")]
    #[diagnostic(
        code(homelink::connection_failed),
        help(
            "Check that the broker is reachable and the TLS server name matches its certificate.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { host: String, reason: String },

    // ── Credentials ──────────────────────────────────────────────────

    #[error("No {what} configured for profile '{profile}'")]
    #[diagnostic(
        code(homelink::no_credentials),
        help(
            "Store it with: homelink --profile {profile} config set-secret <broker-password|storage-api-key>\n\
             Or set HOMELINK_BROKER_PASSWORD / HOMELINK_STORAGE_API_KEY."
        )
    )]
    NoCredentials { profile: String, what: String },

    #[error("The middleware rejected the request for {device}")]
    #[diagnostic(
        code(homelink::unauthorized),
        help("Verify the middleware credentials for this profile.")
    )]
    Unauthorized { device: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(homelink::not_found),
        help("Run: homelink {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Operations ───────────────────────────────────────────────────

    #[error("Command `{command}` for {device} failed: {reason}")]
    #[diagnostic(
        code(homelink::command_failed),
        help("The middleware refused or could not relay the command. Is the device online?")
    )]
    CommandFailed {
        device: String,
        command: String,
        reason: String,
    },

    #[error("Query `{operation}` failed: {reason}")]
    #[diagnostic(
        code(homelink::query_failed),
        help("Both the middleware and the storage tier (if configured) failed to answer.")
    )]
    QueryFailed { operation: String, reason: String },

    #[error("Could not interpret {what}: {reason}")]
    #[diagnostic(code(homelink::parse))]
    Parse { what: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(homelink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(homelink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: homelink config init --name {name} --middleware-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(homelink::no_config),
        help(
            "Create a profile with: homelink config init --middleware-url <URL>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("{0}")]
    #[diagnostic(code(homelink::config))]
    Config(String),

    #[error("Local state cache error: {0}")]
    #[diagnostic(
        code(homelink::state_cache),
        help("Another homelink process may hold the cache open. Set `cache = \"memory\"` to bypass it.")
    )]
    StateCache(String),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(homelink::timeout),
        help("Increase the timeout with --timeout or check the middleware's responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    #[diagnostic(code(homelink::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(homelink::json), help("Check the JSON input and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } | Self::Unauthorized { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    pub fn device_not_found(identifier: &str) -> Self {
        Self::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "devices list".into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { host, reason } => CliError::ConnectionFailed {
                host: if host.is_empty() {
                    "(broker)".into()
                } else {
                    host
                },
                reason,
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Dispatch {
                device,
                status: Some(404),
                ..
            }
            | CoreError::DeviceNotFound { identifier: device } => {
                CliError::device_not_found(&device)
            }

            CoreError::Dispatch {
                device,
                status: Some(401 | 403),
                ..
            } => CliError::Unauthorized { device },

            CoreError::Dispatch {
                device,
                command,
                reason,
                status: _,
            } => CliError::CommandFailed {
                device,
                command,
                reason,
            },

            CoreError::Query { operation, reason } => CliError::QueryFailed { operation, reason },

            CoreError::Parse { what, reason } => CliError::Parse { what, reason },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Config(message),

            CoreError::Storage { message } => CliError::StateCache(message),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile, what } => {
                CliError::NoCredentials { profile, what }
            }
            ConfigError::UnknownProfile(name) => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => {
                CliError::Config(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_status_selects_exit_code() {
        let not_found: CliError = CoreError::Dispatch {
            device: "lamp".into(),
            command: "ON".into(),
            reason: "Device not found or offline".into(),
            status: Some(404),
        }
        .into();
        assert_eq!(not_found.exit_code(), exit_code::NOT_FOUND);

        let server: CliError = CoreError::Dispatch {
            device: "lamp".into(),
            command: "ON".into(),
            reason: "boom".into(),
            status: Some(500),
        }
        .into();
        assert!(matches!(server, CliError::CommandFailed { .. }));
        assert_eq!(server.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn connection_and_timeout_codes() {
        let conn: CliError = CoreError::ConnectionFailed {
            host: String::new(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(conn.exit_code(), exit_code::CONNECTION);
        assert!(conn.to_string().contains("(broker)"));

        let timeout: CliError = CoreError::Timeout { timeout_secs: 30 }.into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn config_errors_map_to_usage_and_auth() {
        let missing: CliError = ConfigError::UnknownProfile("lab".into()).into();
        assert_eq!(missing.exit_code(), exit_code::USAGE);

        let creds: CliError = ConfigError::NoCredentials {
            profile: "lab".into(),
            what: "broker password".into(),
        }
        .into();
        assert_eq!(creds.exit_code(), exit_code::AUTH);
    }
}
