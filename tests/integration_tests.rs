use std::fs;
use std::path::Path;

use congestion_audit::analyzers::analyzer::{ExecutionOptions, audit, run_audit, run_classify};
use congestion_audit::analyzers::ghost::classify;
use congestion_audit::analyzers::types::{ComplianceRate, LeakageEntry};
use congestion_audit::config::AuditConfig;
use congestion_audit::output::{ANNOTATED_FILE, CLEAN_FILE, GHOST_FILE, REPORT_FILE};
use congestion_audit::parser::read_trips;
use congestion_audit::table::{Column, TableError};
use tempfile::TempDir;

const SAMPLE: &str = "tests/fixtures/sample_trips.csv";
const NULL_SPEED: &str = "tests/fixtures/null_speed.csv";

fn options(chunk_size: usize) -> ExecutionOptions {
    ExecutionOptions {
        chunk_size,
        concurrency: 2,
    }
}

#[tokio::test]
async fn test_full_pipeline() {
    let dir = TempDir::new().unwrap();
    let config = AuditConfig::default();

    let report = run_audit(Path::new(SAMPLE), dir.path(), &config, &options(0), false)
        .await
        .expect("audit should succeed");

    assert_eq!(report.rule_counts.total, 10);
    assert_eq!(report.rule_counts.ghost, 3);
    assert_eq!(report.rule_counts.impossible_speed, 1);
    assert_eq!(report.rule_counts.teleporter, 1);
    assert_eq!(report.rule_counts.stationary, 1);

    assert_eq!(report.zone.zone_entries, 4);
    assert_eq!(report.zone.compliant, 1);
    assert_eq!(report.zone.compliance_rate, ComplianceRate::Defined(0.25));
    assert_eq!(
        report.zone.leakage,
        vec![
            LeakageEntry {
                pickup_loc: 7,
                trips: 2,
            },
            LeakageEntry {
                pickup_loc: 138,
                trips: 1,
            },
        ]
    );

    assert_eq!(report.summary.total_trips, 7);
    assert!((report.summary.total_revenue - 108.0).abs() < 1e-9);
    assert!((report.summary.total_congestion_surcharge - 5.0).abs() < 1e-9);

    for file in [CLEAN_FILE, GHOST_FILE, ANNOTATED_FILE, REPORT_FILE] {
        assert!(dir.path().join(file).exists(), "{file} missing");
    }

    let clean = read_trips(dir.path().join(CLEAN_FILE)).unwrap();
    assert_eq!(clean.len(), 7);
    assert!(clean.has_column(Column::AvgSpeed));

    let ghost = fs::read_to_string(dir.path().join(GHOST_FILE)).unwrap();
    let ghost_lines: Vec<_> = ghost.lines().collect();
    assert_eq!(ghost_lines.len(), 4);
    assert!(ghost_lines[0].ends_with(",rules"));
    assert!(ghost_lines[1].ends_with(",impossible_speed"));
    assert!(ghost_lines[2].ends_with(",teleporter"));
    assert!(ghost_lines[3].ends_with(",stationary"));

    let annotated = fs::read_to_string(dir.path().join(ANNOTATED_FILE)).unwrap();
    assert!(
        annotated
            .lines()
            .next()
            .unwrap()
            .ends_with(",pickup_in_zone,dropoff_in_zone,enters_zone")
    );
    assert_eq!(annotated.lines().count(), 8);

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(summary["zone"]["compliance_rate"], 0.25);
    assert_eq!(summary["zone"]["leakage"][0]["pickup_loc"], 7);
}

#[tokio::test]
async fn test_chunked_run_matches_single_chunk() {
    let config = AuditConfig::default();
    let single = run_audit(
        Path::new(SAMPLE),
        TempDir::new().unwrap().path(),
        &config,
        &options(0),
        false,
    )
    .await
    .unwrap();

    let chunked_dir = TempDir::new().unwrap();
    let chunked = run_audit(Path::new(SAMPLE), chunked_dir.path(), &config, &options(3), false)
        .await
        .unwrap();

    assert_eq!(chunked.rule_counts, single.rule_counts);
    assert_eq!(chunked.zone, single.zone);
    assert_eq!(chunked.summary.top_pickups, single.summary.top_pickups);
}

#[tokio::test]
async fn test_gzip_outputs_round_trip() {
    let dir = TempDir::new().unwrap();
    run_audit(
        Path::new(SAMPLE),
        dir.path(),
        &AuditConfig::default(),
        &options(4),
        true,
    )
    .await
    .unwrap();

    let clean = read_trips(dir.path().join(format!("{CLEAN_FILE}.gz"))).unwrap();
    assert_eq!(clean.len(), 7);
    assert!(dir.path().join(format!("{GHOST_FILE}.gz")).exists());
}

#[test]
fn test_classify_only() {
    let dir = TempDir::new().unwrap();
    let counts = run_classify(Path::new(SAMPLE), dir.path(), false).unwrap();

    assert_eq!(counts.clean(), 7);
    assert_eq!(counts.ghost, 3);
    assert!(dir.path().join(CLEAN_FILE).exists());
    assert!(!dir.path().join(REPORT_FILE).exists());
}

#[test]
fn test_zero_duration_trip_stays_clean() {
    let table = read_trips(SAMPLE).unwrap().with_derived_metrics();
    let stalled = &table.records()[9];
    assert_eq!(stalled.trip_duration, Some(0.0));
    assert_eq!(stalled.avg_speed, None);

    let outcome = audit(table, &AuditConfig::default()).unwrap();
    assert!(outcome.clean().iter().any(|t| t.row_id == 9));
}

#[test]
fn test_blank_speed_and_duration_stay_unknown() {
    let table = read_trips(NULL_SPEED)
        .unwrap()
        .with_derived_metrics();
    assert_eq!(table.records()[0].avg_speed, None);
    assert_eq!(table.records()[1].trip_duration, None);

    let result = classify(table).unwrap();
    assert_eq!(result.counts.ghost, 0);
    assert_eq!(result.clean.len(), 2);

    let dir = TempDir::new().unwrap();
    let counts = run_classify(Path::new(NULL_SPEED), dir.path(), false).unwrap();
    assert_eq!(counts.ghost, 0);
}

#[tokio::test]
async fn test_missing_surcharge_column_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = run_audit(
        Path::new("tests/fixtures/no_surcharge.csv"),
        dir.path(),
        &AuditConfig::default(),
        &options(0),
        false,
    )
    .await
    .unwrap_err();

    match err.downcast_ref::<TableError>() {
        Some(TableError::MissingColumns { missing, .. }) => {
            assert_eq!(missing, &vec![Column::CongestionSurcharge]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().join(CLEAN_FILE).exists());
}
