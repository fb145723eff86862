//! Device command handlers.

use tabled::Tabled;

use homelink_core::{DeviceRecord, Hub};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Device ID")]
    device_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl From<&DeviceRecord> for DeviceRow {
    fn from(d: &DeviceRecord) -> Self {
        Self {
            id: d.id.clone(),
            device_id: d.broker_id().to_owned(),
            name: output::or_dash(d.name.as_deref()),
            kind: output::or_dash(d.device_type.as_deref()),
            status: status_label(d),
            location: output::or_dash(d.location.as_deref()),
        }
    }
}

fn status_label(d: &DeviceRecord) -> String {
    match (d.status.as_deref(), d.is_active) {
        (Some(s), _) => s.to_owned(),
        (None, Some(true)) => "active".into(),
        (None, Some(false)) => "inactive".into(),
        (None, None) => "-".into(),
    }
}

fn detail(d: &DeviceRecord) -> String {
    let mut pairs = vec![
        ("id", d.id.clone()),
        ("device_id", d.broker_id().to_owned()),
        ("name", output::or_dash(d.name.as_deref())),
        ("type", output::or_dash(d.device_type.as_deref())),
        ("status", status_label(d)),
        ("location", output::or_dash(d.location.as_deref())),
    ];
    let mut extra: Vec<_> = d.extra.iter().collect();
    extra.sort_by(|a, b| a.0.cmp(b.0));
    for (k, v) in extra {
        pairs.push((k.as_str(), v.to_string()));
    }
    output::detail_lines(&pairs)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(hub: &Hub, args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let devices = hub.queries().get_devices().await?;
            let out = output::render_list(
                &global.output,
                &devices,
                |d| DeviceRow::from(d),
                |d| d.broker_id().to_owned(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { device } => {
            let record = hub
                .queries()
                .get_device(&device)
                .await?
                .ok_or_else(|| CliError::device_not_found(&device))?;
            let out = output::render_single(&global.output, &record, detail, |d| {
                d.broker_id().to_owned()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
