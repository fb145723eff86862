//! Command dispatch: bridges CLI args -> hub operations -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod light;
pub mod sensors;
pub mod util;
pub mod watch;

use homelink_core::Hub;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, hub: &Hub, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(hub, args, global).await,
        Command::Light(args) => light::handle(hub, args, global).await,
        Command::Control(args) => control::handle_control(hub, args, global).await,
        Command::ConfigDevice(args) => control::handle_config_device(hub, args, global).await,
        Command::Alarm(args) => control::handle_alarm(hub, args, global).await,
        Command::Sensors(args) => sensors::handle(hub, args, global).await,
        Command::Watch(args) => watch::handle(hub, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
