//! Shared helpers for command handlers.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use homelink_core::{CachedDeviceState, DeviceId, DispatchOutcome, Route};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Parse a device id argument.
pub fn device_id(raw: &str) -> Result<DeviceId, CliError> {
    raw.parse::<DeviceId>().map_err(|e| CliError::Validation {
        field: "device".into(),
        reason: e.to_string(),
    })
}

/// Interpret a command value: JSON when it parses, a bare string otherwise.
pub fn command_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// Read and parse a JSON file for `--from-file` flags.
pub fn read_json_file(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "from-file".into(),
        reason: format!("invalid JSON: {e}"),
    })
}

// ── Dispatch results ─────────────────────────────────────────────────

#[derive(Serialize)]
struct DispatchView<'a> {
    device_id: &'a str,
    command: &'a str,
    route: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a CachedDeviceState>,
}

fn route_name(route: Route) -> &'static str {
    match route {
        Route::ControlPlane => "middleware",
        Route::Broker => "broker",
    }
}

/// Report a delivered command.
pub fn print_dispatch(
    global: &GlobalOpts,
    device: &DeviceId,
    command: &str,
    outcome: &DispatchOutcome,
) -> Result<(), CliError> {
    let view = DispatchView {
        device_id: device.as_str(),
        command,
        route: route_name(outcome.route),
        request_id: outcome.ack.as_ref().and_then(|a| a.request_id.as_deref()),
        state: outcome.state.as_ref(),
    };
    let out = output::render_single(
        &global.output,
        &view,
        |v| {
            let mut pairs = vec![
                ("device", v.device_id.to_owned()),
                ("command", v.command.to_owned()),
                ("via", v.route.to_owned()),
            ];
            if let Some(id) = v.request_id {
                pairs.push(("request", id.to_owned()));
            }
            if let Some(s) = v.state {
                pairs.extend(state_pairs(s));
            }
            output::detail_lines(&pairs)
        },
        |v| v.route.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Key/value lines for a cached light state.
pub fn state_pairs(state: &CachedDeviceState) -> Vec<(&'static str, String)> {
    vec![
        ("brightness", format!("{}%", state.brightness)),
        ("color", state.color_temperature.to_string()),
        ("power", state.power.to_string()),
    ]
}
