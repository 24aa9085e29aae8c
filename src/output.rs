//! Output formatting and persistence for audit results.
//!
//! Tables are written as CSV, optionally gzip-compressed; the summary report
//! as pretty-printed JSON. The `log_*` helpers emit the audit trail.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use crate::analyzers::ghost::{GhostRule, format_rules};
use crate::analyzers::types::{AuditReport, RuleCounts, ZoneReport};
use crate::analyzers::zone::AnnotatedTable;
use crate::stats::SummaryStats;
use crate::table::{Column, TripTable};

pub const CLEAN_FILE: &str = "clean_data.csv";
pub const GHOST_FILE: &str = "ghost_trips.csv";
pub const ANNOTATED_FILE: &str = "zone_annotated.csv";
pub const REPORT_FILE: &str = "audit_summary.json";

/// Logs the audit report using Rust's debug pretty-print format.
pub fn print_pretty(report: &AuditReport) {
    debug!("{:#?}", report);
}

/// Reports how many trips each ghost rule caught and the share removed.
pub fn log_rule_counts(counts: &RuleCounts) {
    for rule in GhostRule::ALL {
        info!(rule = rule.name(), trips = counts.count(rule), "{}", rule.description());
    }
    info!(
        total = counts.total,
        ghost = counts.ghost,
        clean = counts.clean(),
        percent = %format!("{:.2}", SummaryStats::pct(counts.ghost, counts.total)),
        "Ghost trips removed"
    );
}

pub fn log_zone_report(report: &ZoneReport) {
    info!(
        cutoff = %report.cutoff,
        zone_entries = report.zone_entries,
        compliant = report.compliant,
        compliance_rate = %report.compliance_rate,
        "Congestion zone compliance"
    );
    for (rank, entry) in report.leakage.iter().enumerate() {
        info!(
            rank = rank + 1,
            pickup_loc = entry.pickup_loc,
            trips = entry.trips,
            "Leakage pickup location"
        );
    }
}

pub fn log_summary(summary: &SummaryStats) {
    info!(
        total_trips = summary.total_trips,
        avg_fare = %format!("{:.2}", summary.avg_fare),
        avg_distance = %format!("{:.2}", summary.avg_distance),
        avg_speed = %format!("{:.1}", summary.avg_speed),
        total_revenue = %format!("{:.2}", summary.total_revenue),
        total_congestion_surcharge = %format!("{:.2}", summary.total_congestion_surcharge),
        "Summary statistics"
    );
}

/// Writes `table` with its own schema's columns.
pub fn write_table(path: &Path, table: &TripTable, gzip: bool) -> Result<PathBuf> {
    let columns: Vec<Column> = table.columns().collect();
    let header: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    let rows = table
        .iter()
        .map(|trip| columns.iter().map(|&c| trip.field(c)).collect::<Vec<_>>());

    write_csv(path, gzip, header, rows)
}

/// Writes ghost trips with an extra `rules` column naming what fired.
pub fn write_ghost_table(
    path: &Path,
    ghost: &TripTable,
    rules: &[Vec<GhostRule>],
    gzip: bool,
) -> Result<PathBuf> {
    let columns: Vec<Column> = ghost.columns().collect();
    let mut header: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    header.push("rules".to_string());

    let rows = ghost.iter().zip(rules).map(|(trip, fired)| {
        let mut row: Vec<String> = columns.iter().map(|&c| trip.field(c)).collect();
        row.push(format_rules(fired));
        row
    });

    write_csv(path, gzip, header, rows)
}

/// Writes clean trips with their three zone flags appended.
pub fn write_annotated_table(
    path: &Path,
    annotated: &AnnotatedTable,
    gzip: bool,
) -> Result<PathBuf> {
    let columns: Vec<Column> = annotated.table.columns().collect();
    let mut header: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    header.extend(["pickup_in_zone", "dropoff_in_zone", "enters_zone"].map(String::from));

    let rows = annotated.iter().map(|(trip, flags)| {
        let mut row: Vec<String> = columns.iter().map(|&c| trip.field(c)).collect();
        row.push(flags.pickup_in_zone.to_string());
        row.push(flags.dropoff_in_zone.to_string());
        row.push(flags.enters_zone.to_string());
        row
    });

    write_csv(path, gzip, header, rows)
}

/// Writes the summary report as pretty-printed JSON.
pub fn write_report(path: &Path, report: &AuditReport) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;

    info!(path = %path.display(), "Wrote audit summary");
    Ok(())
}

/// Creates `path` (with `.gz` appended when compressing) and writes a header
/// followed by `rows`. Returns the path actually written.
fn write_csv(
    path: &Path,
    gzip: bool,
    header: Vec<String>,
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<PathBuf> {
    let path = if gzip {
        let mut name = path.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        path.to_path_buf()
    };

    let file =
        File::create(&path).with_context(|| format!("failed to create '{}'", path.display()))?;
    let written = if gzip {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let written = write_rows(&mut encoder, &header, rows)?;
        encoder.finish()?.flush()?;
        written
    } else {
        let mut writer = BufWriter::new(file);
        let written = write_rows(&mut writer, &header, rows)?;
        writer.flush()?;
        written
    };

    info!(path = %path.display(), rows = written, gzip, "Wrote table");
    Ok(path)
}

fn write_rows<W: Write>(
    sink: W,
    header: &[String],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<usize> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(sink);
    writer.write_record(header)?;

    let mut written = 0;
    for row in rows {
        writer.write_record(&row)?;
        written += 1;
    }
    writer.flush()?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::analyzer::audit;
    use crate::analyzers::zone::ZoneMembership;
    use crate::config::AuditConfig;
    use crate::parser::read_trips;
    use crate::table::TripRecord;
    use std::fs;
    use tempfile::TempDir;

    fn sample_table() -> TripTable {
        TripTable::new(
            [Column::PickupLoc, Column::Fare, Column::TripDistance],
            vec![
                TripRecord {
                    pickup_loc: Some(161),
                    fare: Some(12.5),
                    trip_distance: Some(2.0),
                    ..Default::default()
                },
                TripRecord {
                    pickup_loc: None,
                    fare: Some(8.0),
                    trip_distance: Some(0.0),
                    ..Default::default()
                },
            ],
        )
    }

    #[test]
    fn test_write_table_uses_schema_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_table(&dir.path().join("t.csv"), &sample_table(), false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec!["pickup_loc,trip_distance,fare", "161,2,12.5", ",0,8"]);
    }

    #[test]
    fn test_write_table_gzip_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = write_table(&dir.path().join("t.csv"), &sample_table(), true).unwrap();
        assert!(path.to_string_lossy().ends_with("t.csv.gz"));

        let table = read_trips(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].pickup_loc, Some(161));
        assert_eq!(table.records()[1].pickup_loc, None);
    }

    #[test]
    fn test_write_ghost_table_has_rules_column() {
        let dir = TempDir::new().unwrap();
        let table = sample_table();
        let rules = vec![
            vec![GhostRule::ImpossibleSpeed],
            vec![GhostRule::Teleporter, GhostRule::Stationary],
        ];
        let path = write_ghost_table(&dir.path().join("g.csv"), &table, &rules, false).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "pickup_loc,trip_distance,fare,rules");
        assert!(lines[1].ends_with(",impossible_speed"));
        assert!(lines[2].ends_with(",teleporter|stationary"));
    }

    #[test]
    fn test_write_annotated_table_appends_flags() {
        let dir = TempDir::new().unwrap();
        let annotated = AnnotatedTable {
            table: sample_table(),
            membership: vec![
                ZoneMembership {
                    pickup_in_zone: true,
                    dropoff_in_zone: true,
                    enters_zone: false,
                },
                ZoneMembership::default(),
            ],
        };
        let path = write_annotated_table(&dir.path().join("a.csv"), &annotated, false).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "pickup_loc,trip_distance,fare,pickup_in_zone,dropoff_in_zone,enters_zone"
        );
        assert_eq!(lines[1], "161,2,12.5,true,true,false");
        assert_eq!(lines[2], ",0,8,false,false,false");
    }

    #[test]
    fn test_write_report_is_json() {
        let dir = TempDir::new().unwrap();
        let config = AuditConfig::default();
        let outcome = audit(TripTable::with_all_columns(vec![]), &config).unwrap();
        let report = outcome.report(&config);

        let path = dir.path().join(REPORT_FILE);
        write_report(&path, &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["zone"]["compliance_rate"], serde_json::Value::Null);
        assert_eq!(value["zone"]["cutoff"], "2025-01-05");
        assert_eq!(value["rule_counts"]["total"], 0);
    }

    #[test]
    fn test_print_helpers_do_not_panic() {
        let config = AuditConfig::default();
        let report = audit(TripTable::with_all_columns(vec![]), &config)
            .unwrap()
            .report(&config);
        print_pretty(&report);
        log_rule_counts(&report.rule_counts);
        log_zone_report(&report.zone);
        log_summary(&report.summary);
    }
}
