//! Shared configuration for the homelink CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `homelink_core::HubConfig`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use homelink_core::{BrokerConfig, CacheConfig, HttpConfig, HubConfig, StorageConfig};

const KEYRING_SERVICE: &str = "homelink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured for profile '{profile}'")]
    NoCredentials { profile: String, what: String },

    #[error("profile '{0}' not found")]
    UnknownProfile(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named hub profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Middleware base URL (e.g., "http://192.168.1.20:3000").
    pub middleware_url: String,

    /// Topic namespace. Defaults to "smarthome".
    pub namespace: Option<String>,

    /// Broker address to dial.
    pub broker_host: Option<String>,
    pub broker_port: Option<u16>,

    /// Name the broker certificate must carry, when dialing by IP or alias.
    pub tls_server_name: Option<String>,

    pub client_id: Option<String>,
    pub username: Option<String>,

    /// Broker password (plaintext; prefer the keyring or an env var).
    pub password: Option<String>,

    /// Environment variable name containing the broker password.
    pub password_env: Option<String>,

    /// PEM bundle replacing the embedded broker root CA.
    pub broker_ca: Option<PathBuf>,

    /// Storage REST base URL (fallback read tier).
    pub storage_url: Option<String>,

    /// Storage API key (plaintext; prefer the keyring or an env var).
    pub storage_api_key: Option<String>,

    /// Environment variable name containing the storage API key.
    pub storage_api_key_env: Option<String>,

    /// Path to a custom CA certificate for HTTP endpoints.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Broker keep-alive (seconds).
    pub keep_alive: Option<u64>,

    /// "file" (default) or "memory".
    pub cache: Option<String>,

    /// Override the state database path.
    pub cache_path: Option<PathBuf>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", "homelink", "homelink")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the durable light state cache.
pub fn state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.redb"),
        |dirs| dirs.data_dir().join("state.redb"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("homelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + `HOMELINK_` environment variables.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file path, still merging the environment.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOMELINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &std::path::Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a secret: named env var, then keyring entry
/// `homelink/<profile>/<key>`, then the plaintext fallback.
fn resolve_secret(
    env_name: Option<&str>,
    profile_name: &str,
    key: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Env var
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    let from_keyring = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{key}"))
        .and_then(|entry| entry.get_password())
        .ok();
    if let Some(secret) = from_keyring {
        return Some(SecretString::from(secret));
    }

    // 3. Plaintext in config
    plaintext.map(|p| SecretString::from(p.to_owned()))
}

/// Resolve the broker password.
pub fn resolve_broker_password(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    let env_name = profile
        .password_env
        .as_deref()
        .unwrap_or("HOMELINK_BROKER_PASSWORD");
    resolve_secret(
        Some(env_name),
        profile_name,
        "broker-password",
        profile.password.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "broker password".into(),
    })
}

/// Resolve the storage tier API key. Only consulted when the profile
/// names a storage URL.
pub fn resolve_storage_key(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    let env_name = profile
        .storage_api_key_env
        .as_deref()
        .unwrap_or("HOMELINK_STORAGE_API_KEY");
    resolve_secret(
        Some(env_name),
        profile_name,
        "storage-api-key",
        profile.storage_api_key.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "storage API key".into(),
    })
}

/// Store a secret in the system keyring for `profile_name`.
pub fn store_secret(profile_name: &str, key: &str, secret: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{key}"))
        .and_then(|entry| entry.set_password(secret))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation to HubConfig ────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// Build a `HubConfig` from a profile, resolving secrets.
pub fn profile_to_hub_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<HubConfig, ConfigError> {
    let middleware_url = parse_url("middleware_url", &profile.middleware_url)?;
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    let mut broker = BrokerConfig::new(resolve_broker_password(profile, profile_name)?);
    if let Some(ref host) = profile.broker_host {
        broker.host.clone_from(host);
    }
    if let Some(port) = profile.broker_port {
        broker.port = port;
    }
    broker.tls_server_name.clone_from(&profile.tls_server_name);
    if let Some(ref id) = profile.client_id {
        broker.client_id.clone_from(id);
    }
    if let Some(ref user) = profile.username {
        broker.username.clone_from(user);
    }
    if let Some(secs) = profile.keep_alive {
        broker.keep_alive = Duration::from_secs(secs);
    }
    broker.connect_timeout = timeout;
    broker.ca_file.clone_from(&profile.broker_ca);

    let mut http = HttpConfig::new(middleware_url);
    http.timeout = timeout;
    http.ca_file.clone_from(&profile.ca_cert);
    if let Some(ref raw) = profile.storage_url {
        http.storage = Some(StorageConfig {
            url: parse_url("storage_url", raw)?,
            api_key: resolve_storage_key(profile, profile_name)?,
        });
    }

    let mut hub = HubConfig::new(broker, http);
    if let Some(ref ns) = profile.namespace {
        if ns.is_empty() || ns.contains(['/', '+', '#']) {
            return Err(ConfigError::Validation {
                field: "namespace".into(),
                reason: format!("'{ns}' is not a valid topic segment"),
            });
        }
        hub.namespace.clone_from(ns);
    }
    hub.cache = match profile.cache.as_deref() {
        None | Some("file") => {
            CacheConfig::File(profile.cache_path.clone().unwrap_or_else(state_path))
        }
        Some("memory") => CacheConfig::Memory,
        Some(other) => {
            return Err(ConfigError::Validation {
                field: "cache".into(),
                reason: format!("expected 'file' or 'memory', got '{other}'"),
            });
        }
    };
    Ok(hub)
}

/// Pick the profile to use: explicit name, then the configured default.
pub fn select_profile<'a>(
    cfg: &'a Config,
    requested: Option<&str>,
) -> Result<(&'a str, &'a Profile), ConfigError> {
    let name = requested
        .or(cfg.default_profile.as_deref())
        .unwrap_or("default");
    cfg.profiles
        .get_key_value(name)
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| ConfigError::UnknownProfile(name.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn profile() -> Profile {
        Profile {
            middleware_url: "http://10.0.0.5:3000".into(),
            password: Some("mqtt-secret".into()),
            password_env: Some("HOMELINK_TEST_UNSET_PASSWORD_VAR".into()),
            ..Profile::default()
        }
    }

    #[test]
    fn minimal_profile_uses_deployed_defaults() {
        let hub = profile_to_hub_config(&profile(), "test-minimal", &Defaults::default()).unwrap();
        assert_eq!(hub.namespace, "smarthome");
        assert_eq!(hub.broker.port, 8883);
        assert_eq!(hub.broker.client_id, "smarthome-app");
        assert_eq!(hub.broker.username, "APP");
        assert_eq!(hub.broker.password.expose_secret(), "mqtt-secret");
        assert_eq!(hub.http.timeout, Duration::from_secs(30));
        assert!(hub.http.storage.is_none());
        assert!(matches!(hub.cache, CacheConfig::File(_)));
    }

    #[test]
    fn overrides_apply() {
        let p = Profile {
            broker_host: Some("10.0.0.9".into()),
            broker_port: Some(18883),
            tls_server_name: Some("broker.example.net".into()),
            namespace: Some("lab".into()),
            timeout: Some(5),
            cache: Some("memory".into()),
            storage_url: Some("https://db.example.net".into()),
            storage_api_key: Some("anon".into()),
            storage_api_key_env: Some("HOMELINK_TEST_UNSET_KEY_VAR".into()),
            ..profile()
        };
        let hub = profile_to_hub_config(&p, "test-overrides", &Defaults::default()).unwrap();
        assert_eq!(hub.broker.host, "10.0.0.9");
        assert_eq!(hub.broker.port, 18883);
        assert_eq!(hub.broker.tls_server_name.as_deref(), Some("broker.example.net"));
        assert_eq!(hub.broker.connect_timeout, Duration::from_secs(5));
        assert_eq!(hub.namespace, "lab");
        assert_eq!(hub.cache, CacheConfig::Memory);
        assert_eq!(
            hub.http.storage.unwrap().url.as_str(),
            "https://db.example.net/"
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let bad_url = Profile {
            middleware_url: "not a url".into(),
            ..profile()
        };
        assert!(matches!(
            profile_to_hub_config(&bad_url, "t", &Defaults::default()),
            Err(ConfigError::Validation { .. })
        ));

        let bad_ns = Profile {
            namespace: Some("a/b".into()),
            ..profile()
        };
        assert!(profile_to_hub_config(&bad_ns, "t", &Defaults::default()).is_err());

        let bad_cache = Profile {
            cache: Some("disk".into()),
            ..profile()
        };
        assert!(profile_to_hub_config(&bad_cache, "t", &Defaults::default()).is_err());
    }

    #[test]
    fn config_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert("default".into(), profile());
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (name, p) = select_profile(&loaded, None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(p.middleware_url, "http://10.0.0.5:3000");
        assert_eq!(loaded.defaults.output, "table");
        assert!(matches!(
            select_profile(&loaded, Some("missing")),
            Err(ConfigError::UnknownProfile(_))
        ));
    }
}
