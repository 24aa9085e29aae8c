//! Trip records and the columnar schema they travel in.
//!
//! A [`TripTable`] carries the set of columns its source actually provided
//! alongside the records, so analysis stages can refuse to run on a table
//! that lacks the columns their rules read.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;
use thiserror::Error;

/// Normalized trip table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    PickupTime,
    DropoffTime,
    PickupLoc,
    DropoffLoc,
    TripDistance,
    Fare,
    TotalAmount,
    CongestionSurcharge,
    Tip,
    Hour,
    DayOfWeek,
    Month,
    TripDuration,
    AvgSpeed,
}

impl Column {
    /// Every column, in canonical output order.
    pub const ALL: [Column; 14] = [
        Column::PickupTime,
        Column::DropoffTime,
        Column::PickupLoc,
        Column::DropoffLoc,
        Column::TripDistance,
        Column::Fare,
        Column::TotalAmount,
        Column::CongestionSurcharge,
        Column::Tip,
        Column::Hour,
        Column::DayOfWeek,
        Column::Month,
        Column::TripDuration,
        Column::AvgSpeed,
    ];

    /// Header name used in CSV files.
    pub fn name(self) -> &'static str {
        match self {
            Column::PickupTime => "pickup_time",
            Column::DropoffTime => "dropoff_time",
            Column::PickupLoc => "pickup_loc",
            Column::DropoffLoc => "dropoff_loc",
            Column::TripDistance => "trip_distance",
            Column::Fare => "fare",
            Column::TotalAmount => "total_amount",
            Column::CongestionSurcharge => "congestion_surcharge",
            Column::Tip => "tip",
            Column::Hour => "hour",
            Column::DayOfWeek => "day_of_week",
            Column::Month => "month",
            Column::TripDuration => "trip_duration",
            Column::AvgSpeed => "avg_speed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while building or validating a trip table.
#[derive(Debug, Error)]
pub enum TableError {
    /// A stage was handed a table without the columns its rules read.
    #[error("{stage}: missing required column(s): {}", join_columns(.missing))]
    MissingColumns {
        stage: &'static str,
        missing: Vec<Column>,
    },

    #[error("row {row}: invalid value {value:?} for column {column}")]
    InvalidValue {
        row: usize,
        column: Column,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn join_columns(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One taxi ride. Every attribute is nullable because the source data is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripRecord {
    /// Position of the record in the table it was loaded as. Survives
    /// partitioning, so clean and ghost outputs can be traced back.
    pub row_id: u64,
    pub pickup_time: Option<NaiveDateTime>,
    pub dropoff_time: Option<NaiveDateTime>,
    pub pickup_loc: Option<u32>,
    pub dropoff_loc: Option<u32>,
    /// Miles.
    pub trip_distance: Option<f64>,
    pub fare: Option<f64>,
    pub total_amount: Option<f64>,
    pub congestion_surcharge: Option<f64>,
    pub tip: Option<f64>,
    pub hour: Option<u32>,
    /// Monday = 0.
    pub day_of_week: Option<u32>,
    pub month: Option<u32>,
    /// Minutes.
    pub trip_duration: Option<f64>,
    /// Miles per hour.
    pub avg_speed: Option<f64>,
}

impl TripRecord {
    /// Renders a single column as CSV text. Nulls become empty fields.
    pub fn field(&self, column: Column) -> String {
        fn num(v: Option<f64>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }
        fn int(v: Option<u32>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }
        fn time(v: Option<NaiveDateTime>) -> String {
            v.map(|t| t.format("%Y-%m-%d %H:%M:%S%.f").to_string())
                .unwrap_or_default()
        }

        match column {
            Column::PickupTime => time(self.pickup_time),
            Column::DropoffTime => time(self.dropoff_time),
            Column::PickupLoc => int(self.pickup_loc),
            Column::DropoffLoc => int(self.dropoff_loc),
            Column::TripDistance => num(self.trip_distance),
            Column::Fare => num(self.fare),
            Column::TotalAmount => num(self.total_amount),
            Column::CongestionSurcharge => num(self.congestion_surcharge),
            Column::Tip => num(self.tip),
            Column::Hour => int(self.hour),
            Column::DayOfWeek => int(self.day_of_week),
            Column::Month => int(self.month),
            Column::TripDuration => num(self.trip_duration),
            Column::AvgSpeed => num(self.avg_speed),
        }
    }

    /// Pickup hour, preferring the precomputed column.
    pub fn pickup_hour(&self) -> Option<u32> {
        self.hour.or_else(|| self.pickup_time.map(|t| t.hour()))
    }
}

/// Average speed in mph for a trip of `distance` miles over
/// `duration_minutes`. A non-positive duration has no speed.
pub fn derive_speed(distance: f64, duration_minutes: f64) -> Option<f64> {
    if duration_minutes <= 0.0 {
        return None;
    }
    let speed = distance / (duration_minutes / 60.0);
    speed.is_finite().then_some(speed)
}

/// An ordered collection of trips sharing a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripTable {
    columns: BTreeSet<Column>,
    records: Vec<TripRecord>,
}

impl TripTable {
    /// Builds a table and numbers its records by position.
    pub fn new(columns: impl IntoIterator<Item = Column>, records: Vec<TripRecord>) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.row_id = i as u64;
                r
            })
            .collect();

        Self {
            columns: columns.into_iter().collect(),
            records,
        }
    }

    /// A table declaring every normalized column.
    pub fn with_all_columns(records: Vec<TripRecord>) -> Self {
        Self::new(Column::ALL, records)
    }

    /// A table with this table's schema holding `records`, keeping their ids.
    pub fn with_records(&self, records: Vec<TripRecord>) -> Self {
        Self {
            columns: self.columns.clone(),
            records,
        }
    }

    /// Present columns, in canonical order.
    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.columns.iter().copied()
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Fails with every column in `required` the table does not carry.
    pub fn require(&self, stage: &'static str, required: &[Column]) -> Result<(), TableError> {
        let missing: Vec<Column> = required
            .iter()
            .copied()
            .filter(|c| !self.has_column(*c))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingColumns { stage, missing })
        }
    }

    pub fn records(&self) -> &[TripRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TripRecord> {
        self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TripRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Splits into consecutive tables of at most `size` records.
    /// A size of zero yields the whole table as one chunk.
    pub fn into_chunks(self, size: usize) -> Vec<TripTable> {
        if size == 0 || self.records.len() <= size {
            return vec![self];
        }

        let mut chunks = Vec::with_capacity(self.records.len().div_ceil(size));
        let mut records = self.records.into_iter().peekable();
        while records.peek().is_some() {
            chunks.push(TripTable {
                columns: self.columns.clone(),
                records: records.by_ref().take(size).collect(),
            });
        }
        chunks
    }

    /// Fills in duration, speed and calendar columns the source did not
    /// provide, from the timestamps and distance. A column the source did
    /// provide is left alone, nulls included.
    pub fn with_derived_metrics(mut self) -> Self {
        let derive_duration = !self.has_column(Column::TripDuration)
            && self.has_column(Column::PickupTime)
            && self.has_column(Column::DropoffTime);
        let derive_speed_column = !self.has_column(Column::AvgSpeed)
            && self.has_column(Column::TripDistance)
            && (derive_duration || self.has_column(Column::TripDuration));
        let calendar = [Column::Hour, Column::DayOfWeek, Column::Month];
        let derive_calendar: Vec<Column> = if self.has_column(Column::PickupTime) {
            calendar.into_iter().filter(|c| !self.has_column(*c)).collect()
        } else {
            Vec::new()
        };

        for r in &mut self.records {
            if derive_duration {
                r.trip_duration = match (r.pickup_time, r.dropoff_time) {
                    (Some(pickup), Some(dropoff)) => {
                        Some((dropoff - pickup).num_milliseconds() as f64 / 60_000.0)
                    }
                    _ => None,
                };
            }
            if derive_speed_column {
                r.avg_speed = match (r.trip_distance, r.trip_duration) {
                    (Some(distance), Some(duration)) => derive_speed(distance, duration),
                    _ => None,
                };
            }
            if let Some(pickup) = r.pickup_time {
                for column in &derive_calendar {
                    match column {
                        Column::Hour => r.hour = Some(pickup.hour()),
                        Column::DayOfWeek => {
                            r.day_of_week = Some(pickup.weekday().num_days_from_monday())
                        }
                        Column::Month => r.month = Some(pickup.month()),
                        _ => {}
                    }
                }
            }
        }

        if derive_duration {
            self.columns.insert(Column::TripDuration);
        }
        if derive_speed_column {
            self.columns.insert(Column::AvgSpeed);
        }
        self.columns.extend(derive_calendar);

        self
    }
}

impl<'a> IntoIterator for &'a TripTable {
    type Item = &'a TripRecord;
    type IntoIter = std::slice::Iter<'a, TripRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
