//! Raw control, configuration push, and alarm handlers.

use serde::Serialize;

use homelink_core::model::CommandAck;
use homelink_core::{CommandEnvelope, Hub};

use crate::cli::{AlarmArgs, AlarmCommand, ConfigDeviceArgs, ControlArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle_control(
    hub: &Hub,
    args: ControlArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let mut envelope = CommandEnvelope::new(args.command);
    if let Some(raw) = args.value.as_deref() {
        envelope = envelope.with_value(util::command_value(raw));
    }
    let outcome = hub.dispatcher().dispatch(&id, &envelope).await?;
    util::print_dispatch(global, &id, &envelope.command, &outcome)
}

pub async fn handle_config_device(
    hub: &Hub,
    args: ConfigDeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let config = match (args.json.as_deref(), args.from_file.as_deref()) {
        (Some(inline), _) => serde_json::from_str(inline)?,
        (None, Some(path)) => util::read_json_file(path)?,
        (None, None) => {
            return Err(CliError::Validation {
                field: "config".into(),
                reason: "pass inline JSON or --from-file".into(),
            });
        }
    };
    let ack = hub.dispatcher().configure(&id, &config).await?;
    print_ack(global, "config", &ack)
}

pub async fn handle_alarm(hub: &Hub, args: AlarmArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        AlarmCommand::Close { device } => {
            let id = util::device_id(&device)?;
            let ack = hub.dispatcher().close_alarm(&id).await?;
            print_ack(global, "alarm closed", &ack)
        }
    }
}

#[derive(Serialize)]
struct AckView<'a> {
    action: &'a str,
    #[serde(flatten)]
    ack: &'a CommandAck,
}

fn print_ack(global: &GlobalOpts, action: &str, ack: &CommandAck) -> Result<(), CliError> {
    let view = AckView { action, ack };
    let out = output::render_single(
        &global.output,
        &view,
        |v| {
            output::detail_lines(&[
                ("action", v.action.to_owned()),
                ("status", output::or_dash(v.ack.status.as_deref())),
                ("device", output::or_dash(v.ack.device_id.as_deref())),
                ("request", output::or_dash(v.ack.request_id.as_deref())),
            ])
        },
        |v| output::or_dash(v.ack.status.as_deref()),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
