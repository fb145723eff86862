//! CLI side of configuration: picks the config file and profile, applies
//! flag overrides, and hands a `HubConfig` to core.

use std::path::PathBuf;

use homelink_config::{Config, ConfigError, Profile};
use homelink_core::HubConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file selected by `--config` or the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(homelink_config::config_path)
}

/// Load the config file. A missing file yields the default config.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(homelink_config::load_config_from(&config_path(global))?)
}

pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Resolve the active profile with flag overrides applied.
///
/// With no profile on disk, `--middleware` alone is enough; the broker
/// password then has to come from the environment.
pub fn resolve_profile(global: &GlobalOpts, config: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, config);
    let mut profile = match homelink_config::select_profile(config, Some(&name)) {
        Ok((_, p)) => p.clone(),
        Err(ConfigError::UnknownProfile(_)) if global.middleware.is_some() => Profile::default(),
        Err(ConfigError::UnknownProfile(_)) if config.profiles.is_empty() => {
            return Err(CliError::NoConfig {
                path: config_path(global).display().to_string(),
            });
        }
        Err(ConfigError::UnknownProfile(name)) => {
            let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: available.join(", "),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(ref url) = global.middleware {
        profile.middleware_url.clone_from(url);
    }
    if let Some(secs) = global.timeout {
        profile.timeout = Some(secs);
    }
    Ok((name, profile))
}

/// Build the runtime hub configuration for device-bound commands.
pub fn build_hub_config(global: &GlobalOpts) -> Result<HubConfig, CliError> {
    let config = load(global)?;
    let (name, profile) = resolve_profile(global, &config)?;
    let hub = homelink_config::profile_to_hub_config(&profile, &name, &config.defaults)?;
    tracing::debug!(
        profile = %name,
        middleware = %hub.http.middleware_url,
        broker = %hub.broker.host,
        timeout = ?hub.http.timeout,
        "resolved hub configuration"
    );
    Ok(hub)
}
