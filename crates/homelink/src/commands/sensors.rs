//! Sensor command handlers.

use std::time::Duration;

use strum::IntoEnumIterator;
use tabled::Tabled;

use homelink_core::model::SummarySource;
use homelink_core::{
    AggQuery, AggregateBucket, Hub, RawQuery, SensorKind, SensorReading, SensorSummaryReport,
    SortOrder,
};

use crate::cli::{GlobalOpts, OrderArg, RangeArgs, SensorsArgs, SensorsCommand};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl From<&SensorReading> for ReadingRow {
    fn from(r: &SensorReading) -> Self {
        Self {
            time: r.timestamp.clone(),
            device: output::or_dash(r.device_id.as_deref()),
            sensor_type: r.sensor_type.clone(),
            value: reading_value(r),
        }
    }
}

#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Samples")]
    count: String,
}

impl From<&AggregateBucket> for BucketRow {
    fn from(b: &AggregateBucket) -> Self {
        let num = |v: Option<f64>| v.map_or_else(|| "-".into(), |v| format!("{v:.2}"));
        Self {
            bucket: b.bucket.clone(),
            avg: format!("{:.2}", b.avg),
            min: num(b.min),
            max: num(b.max),
            count: b.count.map_or_else(|| "-".into(), |c| c.to_string()),
        }
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Sensor")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Time")]
    time: String,
}

fn reading_value(r: &SensorReading) -> String {
    match r.unit.as_deref() {
        Some(unit) => format!("{} {unit}", r.value),
        None => r.value.to_string(),
    }
}

fn summary_rows(report: &SensorSummaryReport) -> Vec<SummaryRow> {
    SensorKind::iter()
        .map(|kind| {
            let latest = report.get(kind).and_then(<[_]>::first);
            let failure = report.failures.iter().find(|f| f.kind == kind);
            match (latest, failure) {
                (Some(r), _) => SummaryRow {
                    kind: kind.to_string(),
                    value: reading_value(r),
                    time: r.timestamp.clone(),
                },
                (None, Some(f)) => SummaryRow {
                    kind: kind.to_string(),
                    value: format!("unavailable: {}", f.reason),
                    time: "-".into(),
                },
                (None, None) => SummaryRow {
                    kind: kind.to_string(),
                    value: "no data".into(),
                    time: "-".into(),
                },
            }
        })
        .collect()
}

fn render_summary(report: &SensorSummaryReport) -> String {
    let table = tabled::Table::new(summary_rows(report))
        .with(tabled::settings::Style::rounded())
        .to_string();
    match report.source {
        SummarySource::Aggregate => table,
        SummarySource::PerKind => format!("{table}\n(per-sensor fallback)"),
    }
}

fn summary_plain(report: &SensorSummaryReport) -> String {
    SensorKind::iter()
        .map(|kind| match report.latest_value(kind) {
            Some(v) => format!("{kind} {v}"),
            None => format!("{kind} -"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Query construction ──────────────────────────────────────────────

/// Resolve `--since` into an absolute RFC 3339 start.
fn range_start(range: &RangeArgs) -> Result<Option<String>, CliError> {
    match (range.since, &range.from) {
        (Some(since), _) => Ok(Some(since_to_rfc3339(since)?)),
        (None, from) => Ok(from.clone()),
    }
}

fn since_to_rfc3339(since: Duration) -> Result<String, CliError> {
    let delta = chrono::Duration::from_std(since).map_err(|e| CliError::Validation {
        field: "since".into(),
        reason: e.to_string(),
    })?;
    let start = chrono::Utc::now()
        .checked_sub_signed(delta)
        .ok_or_else(|| CliError::Validation {
            field: "since".into(),
            reason: format!("{} reaches before the representable range", humantime::format_duration(since)),
        })?;
    Ok(start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

fn raw_query(range: &RangeArgs, order: OrderArg, limit: Option<u32>) -> Result<RawQuery, CliError> {
    Ok(RawQuery {
        device_id: range.device.clone(),
        sensor_type: range.sensor_type.clone(),
        from: range_start(range)?,
        to: range.to.clone(),
        order: match order {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        },
        limit,
    })
}

fn agg_query(range: &RangeArgs, bucket: String) -> Result<AggQuery, CliError> {
    Ok(AggQuery {
        device_id: range.device.clone(),
        sensor_type: range.sensor_type.clone(),
        from: range_start(range)?,
        to: range.to.clone(),
        bucket,
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(hub: &Hub, args: SensorsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let queries = hub.queries();
    let out = match args.command {
        SensorsCommand::Summary => {
            let report = queries.sensor_summary().await?;
            output::render_single(&global.output, &report, render_summary, summary_plain)?
        }

        SensorsCommand::Latest { sensor_type } => {
            let readings: Vec<SensorReading> = queries
                .latest_sensor_value(&sensor_type)
                .await?
                .into_iter()
                .collect();
            output::render_list(
                &global.output,
                &readings,
                |r| ReadingRow::from(r),
                |r| r.value.to_string(),
            )?
        }

        SensorsCommand::History {
            range,
            order,
            limit,
        } => {
            let readings = queries.sensor_history_raw(&raw_query(&range, order, limit)?).await?;
            output::render_list(
                &global.output,
                &readings,
                |r| ReadingRow::from(r),
                |r| format!("{} {}", r.timestamp, r.value),
            )?
        }

        SensorsCommand::Trend { range, bucket } => {
            let buckets = queries.sensor_history_agg(&agg_query(&range, bucket)?).await?;
            output::render_list(
                &global.output,
                &buckets,
                |b| BucketRow::from(b),
                |b| format!("{} {}", b.bucket, b.avg),
            )?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
