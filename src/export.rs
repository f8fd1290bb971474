//! CSV export of report rows.
//!
//! Files are append-only: when the target already has a header, new rows are
//! written in that header's column order so earlier exports stay readable.

use crate::error::StoreError;
use crate::models::{PartitionSet, ReportRow, UsageTotals};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::debug;

pub const COLUMNS: [&str; 12] = [
    "first_name",
    "last_name",
    "email",
    "kennung",
    "projekt",
    "ai_c_group",
    "cpu_hours",
    "gpu_hours",
    "ram_gb_hours",
    "timestamp",
    "period_start",
    "period_end",
];

pub const PARTITIONS_COLUMN: &str = "partitions";

fn cell(row: &ReportRow, column: &str, partitions: Option<&PartitionSet>) -> String {
    let text = |field: &Option<String>| field.clone().unwrap_or_default();

    match column {
        "first_name" => text(&row.first_name),
        "last_name" => text(&row.last_name),
        "email" => text(&row.email),
        "kennung" => text(&row.kennung),
        "projekt" => text(&row.projekt),
        "ai_c_group" => text(&row.ai_c_group),
        "cpu_hours" => row.usage.cpu_hours.to_string(),
        "gpu_hours" => row.usage.gpu_hours.to_string(),
        "ram_gb_hours" => row.usage.ram_gb_hours.to_string(),
        "timestamp" => text(&row.timestamp),
        "period_start" => text(&row.period_start),
        "period_end" => text(&row.period_end),
        PARTITIONS_COLUMN => partitions.map(PartitionSet::cache_key).unwrap_or_default(),
        _ => String::new(),
    }
}

fn existing_header(path: &Path) -> Result<Option<Vec<String>>, StoreError> {
    if !path.exists() || fs::metadata(path)?.len() == 0 {
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(path)?;
    let header = reader.headers()?.iter().map(str::to_string).collect();
    Ok(Some(header))
}

/// Append `rows` to the CSV file at `path`, returning the number written.
///
/// A new file gets the standard columns, plus `partitions` when a partition
/// set is given.
pub fn write_rows_csv(
    path: &Path,
    rows: &[ReportRow],
    partitions: Option<&PartitionSet>,
) -> Result<usize, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let header = existing_header(path)?;
    let write_header = header.is_none();
    let columns = header.unwrap_or_else(|| {
        let mut columns: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        if partitions.is_some() {
            columns.push(PARTITIONS_COLUMN.to_string());
        }
        columns
    });

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if write_header {
        writer.write_record(&columns)?;
    }
    for row in rows {
        writer.write_record(columns.iter().map(|column| cell(row, column, partitions)))?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = rows.len(), "Wrote CSV rows");
    Ok(rows.len())
}

/// Read rows written by [`write_rows_csv`].
///
/// CSV cannot tell an empty value from a missing one, so blank cells read back
/// as `None`. A field that was `Some("")` (a user without matching groups or
/// email) therefore returns as `None`; both mean "not present" to every reader.
pub fn read_rows_csv(path: &Path) -> Result<Vec<ReportRow>, StoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: HashMap<&str, &str> = header
            .iter()
            .map(String::as_str)
            .zip(record.iter())
            .collect();

        let text = |column: &str| {
            fields
                .get(column)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };
        let number = |column: &str| {
            fields
                .get(column)
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(0.0)
        };

        rows.push(ReportRow {
            first_name: text("first_name"),
            last_name: text("last_name"),
            email: text("email"),
            kennung: text("kennung"),
            projekt: text("projekt"),
            ai_c_group: text("ai_c_group"),
            usage: UsageTotals::new(number("cpu_hours"), number("gpu_hours"), number("ram_gb_hours")),
            timestamp: text("timestamp"),
            period_start: text("period_start"),
            period_end: text("period_end"),
        });
    }

    Ok(rows)
}
