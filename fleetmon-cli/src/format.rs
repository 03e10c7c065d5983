//! Output rendering for collected snapshots.

use chrono::Utc;
use fleetmon_core::metrics::{MetricSnapshot, MetricValue};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Renders snapshots in the requested format.
///
/// # Errors
/// `Output` when JSON serialization fails.
pub fn render(snapshots: &[MetricSnapshot], format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(snapshots)?),
        OutputFormat::Table => Ok(render_table(snapshots)),
    }
}

fn render_table(snapshots: &[MetricSnapshot]) -> String {
    let now = Utc::now();
    let mut out = String::new();
    for snapshot in snapshots {
        out.push_str(&format!(
            "{} / {} (age {}ms)\n",
            snapshot.host,
            snapshot.collector,
            snapshot.age(now).as_millis()
        ));
        match &snapshot.result {
            Ok(payload) => {
                let width = payload
                    .fields
                    .keys()
                    .map(String::len)
                    .max()
                    .unwrap_or(0);
                for (key, value) in &payload.fields {
                    out.push_str(&format!("  {key:<width$}  {}\n", display_value(value)));
                }
                if payload.partial {
                    out.push_str("  (partial: some sections did not parse)\n");
                }
            }
            Err(err) => {
                out.push_str(&format!("  error [{:?}]: {}\n", err.kind, err.message));
            }
        }
    }
    out
}

fn display_value(value: &MetricValue) -> String {
    match value {
        MetricValue::Bool(v) => v.to_string(),
        MetricValue::Integer(v) => v.to_string(),
        MetricValue::Float(v) => format!("{v:.2}"),
        MetricValue::Text(v) => v.clone(),
    }
}
