//! Light command handlers.

use homelink_core::{ColorTemperature, Hub, LightCommand as CoreLightCommand, PowerState};

use crate::cli::{ColorArg, GlobalOpts, LightArgs, LightCommand, PowerArg};
use crate::error::CliError;
use crate::output;

use super::util;

impl From<ColorArg> for ColorTemperature {
    fn from(c: ColorArg) -> Self {
        match c {
            ColorArg::Natural => Self::Natural,
            ColorArg::Cool => Self::Cool,
            ColorArg::Warm => Self::Warm,
        }
    }
}

impl From<PowerArg> for PowerState {
    fn from(p: PowerArg) -> Self {
        match p {
            PowerArg::On => Self::On,
            PowerArg::Off => Self::Off,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(hub: &Hub, args: LightArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        LightCommand::Brightness { device, level } => {
            send(hub, global, &device, &CoreLightCommand::Brightness(level)).await
        }
        LightCommand::Color { device, mode } => {
            send(hub, global, &device, &CoreLightCommand::ColorTemperature(mode.into())).await
        }
        LightCommand::Power { device, state } => {
            send(hub, global, &device, &CoreLightCommand::Power(state.into())).await
        }
        LightCommand::Timer {
            device,
            state,
            at: (hour, minute),
        } => {
            let timer = CoreLightCommand::Timer {
                action: state.into(),
                hour,
                minute,
            };
            send(hub, global, &device, &timer).await
        }
        LightCommand::State { device } => {
            let id = util::device_id(&device)?;
            let state = hub.device_state(&id).await?;
            let out = output::render_single(
                &global.output,
                &state,
                |s| output::detail_lines(&util::state_pairs(s)),
                |s| format!("{} {} {}", s.power, s.brightness, s.color_temperature),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

async fn send(
    hub: &Hub,
    global: &GlobalOpts,
    device: &str,
    command: &CoreLightCommand,
) -> Result<(), CliError> {
    let id = util::device_id(device)?;
    let outcome = hub.dispatcher().send_light(&id, command).await?;
    util::print_dispatch(global, &id, &command.envelope().command, &outcome)
}
