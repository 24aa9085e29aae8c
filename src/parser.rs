//! CSV decoding of normalized trip tables.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::table::{Column, TableError, TripRecord, TripTable};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Decodes a trip table from CSV with a header row.
///
/// Headers that are not normalized column names are ignored. The table's
/// schema is exactly the recognized headers, so a later stage can tell an
/// absent column from a column full of nulls.
///
/// # Errors
///
/// Returns an error if the CSV is malformed or a non-null field cannot be
/// read as its column's type.
pub fn parse_trips<R: Read>(reader: R) -> Result<TripTable, TableError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut positions = Vec::new();
    for (index, header) in rdr.headers()?.iter().enumerate() {
        match Column::from_name(header) {
            Some(column) => positions.push((index, column)),
            None => debug!(header, "Ignoring unknown column"),
        }
    }

    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let raw = result?;
        let mut record = TripRecord::default();
        for &(index, column) in &positions {
            let value = raw.get(index).unwrap_or("");
            set_field(&mut record, column, value).ok_or_else(|| TableError::InvalidValue {
                row,
                column,
                value: value.to_string(),
            })?;
        }
        records.push(record);
    }

    Ok(TripTable::new(positions.into_iter().map(|(_, c)| c), records))
}

/// Reads a trip table from a `.csv` or gzip-compressed `.csv.gz` file.
pub fn read_trips(path: impl AsRef<Path>) -> Result<TripTable> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    let reader = BufReader::new(file);

    let table = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        parse_trips(GzDecoder::new(reader))
    } else {
        parse_trips(reader)
    }
    .with_context(|| format!("failed to decode trips from '{}'", path.display()))?;

    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().count(),
        "Loaded trip table"
    );
    Ok(table)
}

fn is_null(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("null")
}

/// Stores `value` into `column`. `None` means the text did not parse.
fn set_field(record: &mut TripRecord, column: Column, value: &str) -> Option<()> {
    if is_null(value) {
        return Some(());
    }

    match column {
        Column::PickupTime => record.pickup_time = Some(parse_datetime(value)?),
        Column::DropoffTime => record.dropoff_time = Some(parse_datetime(value)?),
        Column::PickupLoc => record.pickup_loc = Some(parse_int(value)?),
        Column::DropoffLoc => record.dropoff_loc = Some(parse_int(value)?),
        Column::TripDistance => record.trip_distance = Some(value.parse().ok()?),
        Column::Fare => record.fare = Some(value.parse().ok()?),
        Column::TotalAmount => record.total_amount = Some(value.parse().ok()?),
        Column::CongestionSurcharge => record.congestion_surcharge = Some(value.parse().ok()?),
        Column::Tip => record.tip = Some(value.parse().ok()?),
        Column::Hour => record.hour = Some(parse_int(value)?),
        Column::DayOfWeek => record.day_of_week = Some(parse_int(value)?),
        Column::Month => record.month = Some(parse_int(value)?),
        Column::TripDuration => record.trip_duration = Some(value.parse().ok()?),
        Column::AvgSpeed => record.avg_speed = Some(value.parse().ok()?),
    }
    Some(())
}

/// Integers, also accepting integral floats such as `"161.0"` written by
/// dataframe exports of nullable integer columns.
fn parse_int(value: &str) -> Option<u32> {
    if let Ok(v) = value.parse::<u32>() {
        return Some(v);
    }
    let v: f64 = value.parse().ok()?;
    (v.fract() == 0.0 && v >= 0.0 && v <= f64::from(u32::MAX)).then_some(v as u32)
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}
