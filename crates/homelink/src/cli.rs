//! Clap derive structures for the `homelink` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// homelink -- control lights and read sensors on a homelink hub
#[derive(Debug, Parser)]
#[command(
    name = "homelink",
    version,
    about = "Control smart-home devices and read sensors from the command line",
    long_about = "Talks to a homelink deployment: commands go through the middleware\n\
        control plane, presence checks and live status go over the MQTT broker,\n\
        and reads fall back to the storage tier when the middleware is down.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HOMELINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "HOMELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Middleware URL (overrides profile)
    #[arg(long, short = 'm', env = "HOMELINK_MIDDLEWARE", global = true)]
    pub middleware: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HOMELINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "HOMELINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List and inspect registered devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Control a light
    #[command(alias = "l")]
    Light(LightArgs),

    /// Send a raw command to a device
    Control(ControlArgs),

    /// Push a configuration object to a device
    ConfigDevice(ConfigDeviceArgs),

    /// Manage device alarms
    Alarm(AlarmArgs),

    /// Read sensor values and history
    #[command(alias = "s")]
    Sensors(SensorsArgs),

    /// Follow live device status over the broker
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List all devices
    #[command(alias = "ls")]
    List,

    /// Show one device (row id or broker device id)
    Get {
        /// Device identifier
        device: String,
    },
}

// ── Light ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LightArgs {
    #[command(subcommand)]
    pub command: LightCommand,
}

#[derive(Debug, Subcommand)]
pub enum LightCommand {
    /// Set brightness (0-100)
    #[command(alias = "b")]
    Brightness {
        device: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },

    /// Set color temperature
    #[command(alias = "c")]
    Color { device: String, mode: ColorArg },

    /// Switch the light on or off
    Power { device: String, state: PowerArg },

    /// Schedule the light to switch at a time of day
    Timer {
        device: String,
        state: PowerArg,
        /// Time of day as HH:MM (24h)
        #[arg(value_parser = parse_time_of_day)]
        at: (u8, u8),
    },

    /// Show the locally cached state
    State { device: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorArg {
    Natural,
    Cool,
    Warm,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}

// ── Control / config push / alarm ────────────────────────────────────

#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Target device id
    pub device: String,

    /// Command tag (e.g. BRIGHTNESS_SET, ON, PING)
    pub command: String,

    /// Command value; parsed as JSON when possible, otherwise sent as a string
    pub value: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigDeviceArgs {
    /// Target device id
    pub device: String,

    /// Configuration object as inline JSON
    #[arg(conflicts_with = "from_file", required_unless_present = "from_file")]
    pub json: Option<String>,

    /// Read the configuration object from a JSON file
    #[arg(long, short = 'F')]
    pub from_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AlarmArgs {
    #[command(subcommand)]
    pub command: AlarmCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlarmCommand {
    /// Acknowledge and silence a device's alarm
    Close { device: String },
}

// ── Sensors ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SensorsArgs {
    #[command(subcommand)]
    pub command: SensorsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SensorsCommand {
    /// Latest temperature, humidity, and gas readings
    Summary,

    /// Latest reading of one sensor type
    Latest {
        /// Sensor type (temperature, humidity, gas, or a backend name)
        sensor_type: String,
    },

    /// Raw readings over a time range
    History {
        #[command(flatten)]
        range: RangeArgs,

        /// Sort order
        #[arg(long, default_value = "asc")]
        order: OrderArg,

        /// Maximum rows (1-10000)
        #[arg(long, short = 'l')]
        limit: Option<u32>,
    },

    /// Bucketed averages over a time range
    Trend {
        #[command(flatten)]
        range: RangeArgs,

        /// Bucket width (e.g. 15m, 1h, 1d)
        #[arg(long, short = 'b', default_value = "1h")]
        bucket: String,
    },
}

/// Filters shared by the history queries.
#[derive(Debug, Args)]
pub struct RangeArgs {
    /// Restrict to one device
    #[arg(long, short = 'd')]
    pub device: Option<String>,

    /// Restrict to one sensor type
    #[arg(long = "type", short = 't')]
    pub sensor_type: Option<String>,

    /// Relative start (e.g. 30m, 6h, 2days); conflicts with --from
    #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "from")]
    pub since: Option<Duration>,

    /// Absolute start (RFC 3339)
    #[arg(long)]
    pub from: Option<String>,

    /// Absolute end (RFC 3339)
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Devices to follow; every status report is shown when omitted
    pub devices: Vec<String>,

    /// Stop after this long (e.g. 30s, 5m); runs until Ctrl-C otherwise
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile
    Init(InitArgs),

    /// Show the resolved configuration (secrets redacted)
    Show,

    /// Store a secret for the active profile in the system keyring
    SetSecret {
        /// Which secret to store
        key: SecretKey,

        /// Secret value; read from stdin when omitted
        #[arg(long)]
        value: Option<String>,
    },

    /// Set the default profile
    Use { name: String },

    /// List profile names
    Profiles,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Profile name
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Middleware URL
    #[arg(long)]
    pub middleware_url: String,

    /// Broker host to dial
    #[arg(long)]
    pub broker_host: Option<String>,

    /// Broker TLS port
    #[arg(long)]
    pub broker_port: Option<u16>,

    /// Topic namespace
    #[arg(long)]
    pub namespace: Option<String>,

    /// Storage tier root URL (enables read fallback)
    #[arg(long)]
    pub storage_url: Option<String>,

    /// Keep the light state cache in memory only
    #[arg(long)]
    pub memory_cache: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecretKey {
    BrokerPassword,
    StorageApiKey,
}

impl SecretKey {
    pub fn keyring_key(self) -> &'static str {
        match self {
            Self::BrokerPassword => "broker-password",
            Self::StorageApiKey => "storage-api-key",
        }
    }
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_time_of_day(raw: &str) -> Result<(u8, u8), String> {
    let (h, m) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got '{raw}'"))?;
    let hour: u8 = h.parse().map_err(|_| format!("invalid hour '{h}'"))?;
    let minute: u8 = m.parse().map_err(|_| format!("invalid minute '{m}'"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("'{raw}' is not a valid time of day"));
    }
    Ok((hour, minute))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn time_of_day_parsing() {
        assert_eq!(parse_time_of_day("07:30").unwrap(), (7, 30));
        assert_eq!(parse_time_of_day("23:59").unwrap(), (23, 59));
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("7").is_err());
        assert!(parse_time_of_day("aa:10").is_err());
    }

    #[test]
    fn brightness_range_is_enforced() {
        let err = Cli::try_parse_from(["homelink", "light", "brightness", "lamp", "101"]);
        assert!(err.is_err());
        let ok = Cli::try_parse_from(["homelink", "light", "brightness", "lamp", "45"]).unwrap();
        assert!(matches!(
            ok.command,
            Command::Light(LightArgs {
                command: LightCommand::Brightness { level: 45, .. }
            })
        ));
    }
}
