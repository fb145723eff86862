//! Config subcommand handlers.

use std::io::BufRead;

use homelink_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

fn save(cfg: &Config, global: &GlobalOpts) -> Result<std::path::PathBuf, CliError> {
    let path = config::config_path(global);
    homelink_config::save_config_to(cfg, &path)?;
    Ok(path)
}

fn profile_from_init(args: &InitArgs) -> Result<Profile, CliError> {
    args.middleware_url
        .parse::<url::Url>()
        .map_err(|e| CliError::Validation {
            field: "middleware-url".into(),
            reason: format!("invalid URL '{}': {e}", args.middleware_url),
        })?;
    Ok(Profile {
        middleware_url: args.middleware_url.clone(),
        namespace: args.namespace.clone(),
        broker_host: args.broker_host.clone(),
        broker_port: args.broker_port,
        storage_url: args.storage_url.clone(),
        cache: args.memory_cache.then(|| "memory".to_owned()),
        ..Profile::default()
    })
}

/// Copy of `cfg` with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mask = |s: Option<&String>| s.map(|_| REDACTED.to_owned());
    Config {
        default_profile: cfg.default_profile.clone(),
        defaults: homelink_config::Defaults {
            output: cfg.defaults.output.clone(),
            timeout: cfg.defaults.timeout,
        },
        profiles: cfg
            .profiles
            .iter()
            .map(|(name, p)| {
                let mut p = p.clone();
                p.password = mask(p.password.as_ref());
                p.storage_api_key = mask(p.storage_api_key.as_ref());
                (name.clone(), p)
            })
            .collect(),
    }
}

fn read_secret_from_stdin() -> Result<String, CliError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init(init) => {
            let mut cfg = config::load(global)?;
            let profile = profile_from_init(&init)?;
            let first = cfg.profiles.is_empty();
            cfg.profiles.insert(init.name.clone(), profile);
            if first || cfg.default_profile.is_none() {
                cfg.default_profile = Some(init.name.clone());
            }
            let path = save(&cfg, global)?;
            if !global.quiet {
                eprintln!("Profile '{}' written to {}", init.name, path.display());
                eprintln!(
                    "Store the broker password with: homelink --profile {} config set-secret broker-password",
                    init.name
                );
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&config::load(global)?);
            let out = match global.output {
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
                OutputFormat::JsonCompact => serde_json::to_string(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => {
                    let body = toml::to_string_pretty(&cfg).map_err(|e| CliError::Config(e.to_string()))?;
                    format!("# {}\n{body}", config::config_path(global).display())
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetSecret { key, value } => {
            let cfg = config::load(global)?;
            let profile = config::active_profile_name(global, &cfg);
            let secret = match value {
                Some(v) => v,
                None => read_secret_from_stdin()?,
            };
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: key.keyring_key().into(),
                    reason: "secret cannot be empty".into(),
                });
            }
            homelink_config::store_secret(&profile, key.keyring_key(), &secret)?;
            if !global.quiet {
                eprintln!("Stored {} for profile '{profile}' in the system keyring", key.keyring_key());
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load(global)?;
            if !cfg.profiles.contains_key(&name) {
                let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
                available.sort_unstable();
                return Err(CliError::ProfileNotFound {
                    available: available.join(", "),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            save(&cfg, global)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let mut names: Vec<String> = cfg.profiles.keys().cloned().collect();
            names.sort_unstable();
            let active = config::active_profile_name(global, &cfg);
            let out = output::render_single(
                &global.output,
                &names,
                |ns| {
                    ns.iter()
                        .map(|n| {
                            let marker = if *n == active { "*" } else { " " };
                            format!("{marker} {n}")
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                },
                |ns| ns.join("\n"),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
