//! Live status following.
//!
//! With device arguments, prints each device's reconciled state whenever
//! it changes. Without, prints every status report the broker delivers.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::select_all;
use serde::Serialize;
use tokio::sync::mpsc;

use homelink_core::{CachedDeviceState, DeviceId, Hub, StatusListener, StatusReport};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct StateEvent<'a> {
    device_id: &'a str,
    #[serde(flatten)]
    state: &'a CachedDeviceState,
}

pub async fn handle(hub: &Hub, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = args
        .devices
        .iter()
        .map(|d| util::device_id(d))
        .collect::<Result<Vec<_>, _>>()?;

    hub.connect().await?;
    if !global.quiet {
        eprintln!("Connected to {}; press Ctrl-C to stop", hub.config().broker.host);
    }

    let stop = stop_signal(args.duration);
    if devices.is_empty() {
        follow_reports(hub, global, stop).await
    } else {
        follow_devices(hub, &devices, global, stop).await
    }
}

/// Resolves on Ctrl-C or after `duration`, whichever comes first.
fn stop_signal(duration: Option<std::time::Duration>) -> impl Future<Output = ()> {
    async move {
        let elapsed = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = elapsed => {}
        }
    }
}

// ── Reconciled state per device ──────────────────────────────────────

async fn follow_devices(
    hub: &Hub,
    devices: &[DeviceId],
    global: &GlobalOpts,
    stop: impl Future<Output = ()>,
) -> Result<(), CliError> {
    let mut streams = Vec::with_capacity(devices.len());
    for id in devices {
        let id = id.clone();
        let watch = hub.watch_device(&id).await?;
        streams.push(watch.into_stream().map(move |state| (id.clone(), state)));
    }
    let mut updates = select_all(streams);

    tokio::pin!(stop);
    loop {
        tokio::select! {
            biased;
            () = &mut stop => break,
            next = updates.next() => match next {
                Some((id, state)) => print_state(global, &id, &state)?,
                None => break,
            },
        }
    }
    Ok(())
}

fn print_state(global: &GlobalOpts, id: &DeviceId, state: &CachedDeviceState) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(&StateEvent {
            device_id: id.as_str(),
            state,
        })?,
        OutputFormat::Table | OutputFormat::Plain => format!(
            "{} {id} power={} brightness={} color={}",
            timestamp(),
            state.power,
            state.brightness,
            state.color_temperature
        ),
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

// ── Raw status reports ───────────────────────────────────────────────

async fn follow_reports(
    hub: &Hub,
    global: &GlobalOpts,
    stop: impl Future<Output = ()>,
) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusReport>();
    let forward = move |report: &StatusReport| {
        let _ = tx.send(report.clone());
    };
    let listener: Arc<dyn StatusListener> = Arc::new(forward);
    let id = hub.listeners().add(listener);

    tokio::pin!(stop);
    let result = loop {
        tokio::select! {
            biased;
            () = &mut stop => break Ok(()),
            report = rx.recv() => match report {
                Some(report) => {
                    if let Err(e) = print_report(global, &report) {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };
    hub.listeners().remove(id);
    result
}

fn print_report(global: &GlobalOpts, report: &StatusReport) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(&report.raw)?,
        OutputFormat::Table | OutputFormat::Plain => {
            let mut parts = vec![timestamp(), report.device_id.to_string()];
            if let Some(p) = report.power {
                parts.push(format!("power={p}"));
            }
            if let Some(b) = report.brightness {
                parts.push(format!("brightness={b}"));
            }
            if let Some(c) = report.color_temperature {
                parts.push(format!("color={c}"));
            }
            if !report.has_attributes() {
                parts.push(report.raw.to_string());
            }
            parts.join(" ")
        }
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
