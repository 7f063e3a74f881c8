//! Flat CSV tables: raw venue dumps, reference ticks and aggregated buckets.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::analysis::resample::PriceTick;
use crate::error::{AppError, Result};
use crate::types::{naive_from_millis, AggregatedBucket};

/// A row type with a fixed column layout. `HEADER` must list the serde field
/// names in declaration order so that an empty table still carries a header.
pub trait TableRow: Serialize + DeserializeOwned {
    const HEADER: &'static [&'static str];
}

/// Write `rows` to `path`, replacing any existing file and creating the parent directory.
pub fn write_rows<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(T::HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_rows<T: TableRow>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Reference ticks
// ---------------------------------------------------------------------------

/// One line of the reference-exchange export. Either `datetime` or
/// `timestamp` (epoch milliseconds) must be present; other columns are ignored.
#[derive(Debug, Deserialize)]
struct ReferenceTickRow {
    datetime: Option<String>,
    timestamp: Option<f64>,
    mid_price: Option<f64>,
}

pub fn read_reference_ticks(path: &Path) -> Result<Vec<PriceTick>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    check_reference_columns(path, reader.headers()?)?;
    let mut ticks = Vec::new();
    for (line, record) in reader.deserialize::<ReferenceTickRow>().enumerate() {
        let row = record?;
        let datetime = tick_datetime(&row).ok_or_else(|| {
            AppError::DataShape(format!(
                "{}: tick {} has no usable datetime or timestamp",
                path.display(),
                line + 1
            ))
        })?;
        ticks.push(PriceTick {
            datetime,
            mid_price: row.mid_price,
        });
    }
    Ok(ticks)
}

/// Empty cells are tolerated per row; a missing column is not.
fn check_reference_columns(path: &Path, headers: &csv::StringRecord) -> Result<()> {
    let has = |name: &str| headers.iter().any(|h| h.trim() == name);
    if !has("mid_price") {
        return Err(AppError::DataShape(format!(
            "{}: no mid_price column",
            path.display()
        )));
    }
    if !has("datetime") && !has("timestamp") {
        return Err(AppError::DataShape(format!(
            "{}: needs a datetime or timestamp column",
            path.display()
        )));
    }
    Ok(())
}

fn tick_datetime(row: &ReferenceTickRow) -> Option<NaiveDateTime> {
    if let Some(text) = row.datetime.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return parse_tick_datetime(text);
    }
    row.timestamp
        .filter(|ms| ms.is_finite())
        .and_then(|ms| naive_from_millis(ms as i64))
}

/// Accepts `2024-01-01 00:00:01.250`, the `T`-separated variant, or RFC 3339
/// with an offset (converted to UTC).
pub fn parse_tick_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
}

// ---------------------------------------------------------------------------
// Aggregated buckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub bucket: String,
    pub bucket_lower: f64,
    pub bucket_upper: f64,
    pub trade_count: usize,
    pub avg_cost_diff: Option<f64>,
}

impl TableRow for AggregatedRow {
    const HEADER: &'static [&'static str] = &[
        "bucket",
        "bucket_lower",
        "bucket_upper",
        "trade_count",
        "avg_cost_diff",
    ];
}

impl From<&AggregatedBucket> for AggregatedRow {
    fn from(b: &AggregatedBucket) -> Self {
        Self {
            bucket: b.label(),
            bucket_lower: b.lower,
            bucket_upper: b.upper,
            trade_count: b.trade_count,
            avg_cost_diff: b.avg_cost_diff,
        }
    }
}

pub fn write_aggregated(path: &Path, buckets: &[AggregatedBucket]) -> Result<()> {
    let rows: Vec<AggregatedRow> = buckets.iter().map(AggregatedRow::from).collect();
    write_rows(path, &rows)
}
