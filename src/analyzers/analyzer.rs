use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::analyzers::ghost::{self, GhostRule, classify};
use crate::analyzers::types::{AuditReport, ComplianceTally, RuleCounts};
use crate::analyzers::zone::{self, AnnotatedTable, ZoneMembership, analyze_zone};
use crate::config::AuditConfig;
use crate::output;
use crate::parser::read_trips;
use crate::stats::{StatsAccumulator, SummaryStats};
use crate::table::{TableError, TripRecord, TripTable};

/// How a table is split up for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Records per chunk. Zero processes the table as one chunk.
    pub chunk_size: usize,
    /// Chunks processed at the same time.
    pub concurrency: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 250_000,
            concurrency: std::thread::available_parallelism().map_or(4, |n| n.get()),
        }
    }
}

/// Classified, zone-annotated and summarized trips.
#[derive(Debug, Clone, Default)]
pub struct AuditOutcome {
    /// Clean trips with their zone flags.
    pub annotated: AnnotatedTable,
    pub ghost: TripTable,
    pub ghost_rules: Vec<Vec<GhostRule>>,
    pub rule_counts: RuleCounts,
    pub tally: ComplianceTally,
    stats: StatsAccumulator,
}

impl AuditOutcome {
    pub fn clean(&self) -> &TripTable {
        &self.annotated.table
    }

    /// Statistics over the clean trips.
    pub fn summary(&self) -> SummaryStats {
        self.stats.finish()
    }

    pub fn report(&self, config: &AuditConfig) -> AuditReport {
        AuditReport {
            schema_version: 1,
            generated_at: Utc::now(),
            rule_counts: self.rule_counts,
            ghost_fraction: self.rule_counts.ghost_fraction(),
            zone: self.tally.report(config.cutoff, config.top_k),
            summary: self.summary(),
        }
    }
}

/// Results for one chunk, in a shape that concatenates and merges.
#[derive(Debug, Default)]
struct Partial {
    clean: Vec<TripRecord>,
    membership: Vec<ZoneMembership>,
    ghost: Vec<TripRecord>,
    ghost_rules: Vec<Vec<GhostRule>>,
    rule_counts: RuleCounts,
    tally: ComplianceTally,
    stats: StatsAccumulator,
}

impl Partial {
    /// Appends `later`, which must cover records after this one's.
    fn append(&mut self, later: Partial) {
        self.clean.extend(later.clean);
        self.membership.extend(later.membership);
        self.ghost.extend(later.ghost);
        self.ghost_rules.extend(later.ghost_rules);
        self.rule_counts.merge(&later.rule_counts);
        self.tally.merge(&later.tally);
        self.stats.merge(&later.stats);
    }

    fn into_outcome(self, schema: &TripTable) -> AuditOutcome {
        AuditOutcome {
            annotated: AnnotatedTable {
                table: schema.with_records(self.clean),
                membership: self.membership,
            },
            ghost: schema.with_records(self.ghost),
            ghost_rules: self.ghost_rules,
            rule_counts: self.rule_counts,
            tally: self.tally,
            stats: self.stats,
        }
    }
}

fn require_audit_columns(table: &TripTable) -> Result<(), TableError> {
    let mut required = ghost::REQUIRED_COLUMNS.to_vec();
    required.extend(zone::REQUIRED_COLUMNS);
    table.require("audit", &required)
}

/// Classifies one chunk, then runs the zone stage and statistics over its
/// clean half.
fn audit_partition(chunk: TripTable, config: &AuditConfig) -> Result<Partial, TableError> {
    let classification = classify(chunk)?;
    let analysis = analyze_zone(classification.clean, config)?;

    let mut stats = StatsAccumulator::default();
    for trip in &analysis.annotated.table {
        stats.add(trip);
    }

    Ok(Partial {
        clean: analysis.annotated.table.into_records(),
        membership: analysis.annotated.membership,
        ghost: classification.ghost.into_records(),
        ghost_rules: classification.ghost_rules,
        rule_counts: classification.counts,
        tally: analysis.tally,
        stats,
    })
}

/// Runs the full audit over `table` in one pass.
///
/// # Errors
///
/// Fails without processing any record if a column either stage needs is
/// missing.
pub fn audit(table: TripTable, config: &AuditConfig) -> Result<AuditOutcome, TableError> {
    require_audit_columns(&table)?;
    let schema = table.with_records(Vec::new());
    Ok(audit_partition(table, config)?.into_outcome(&schema))
}

/// Runs the full audit over chunks of `table` on blocking workers, at most
/// `options.concurrency` at a time, and merges the results in record order.
/// Produces the same outcome as [`audit`].
#[tracing::instrument(
    skip_all,
    fields(
        rows = table.len(),
        chunk_size = options.chunk_size,
        concurrency = options.concurrency
    )
)]
pub async fn audit_chunked(
    table: TripTable,
    config: &AuditConfig,
    options: &ExecutionOptions,
) -> Result<AuditOutcome> {
    require_audit_columns(&table)?;
    let schema = table.with_records(Vec::new());

    let chunks = table.into_chunks(options.chunk_size);
    info!(chunks = chunks.len(), "Auditing trip table");

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let config = Arc::new(config.clone());
    let mut tasks = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.into_iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let config = Arc::clone(&config);
        let span = tracing::debug_span!("audit_chunk", chunk = index, rows = chunk.len());

        tasks.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _entered = span.enter();
            let partial = audit_partition(chunk, &config);
            debug!("Chunk audited");
            partial
        }));
    }

    let mut merged = Partial::default();
    for task in tasks {
        merged.append(task.await??);
    }

    Ok(merged.into_outcome(&schema))
}

/// Loads `input`, audits it and writes the clean, ghost and zone-annotated
/// tables plus `audit_summary.json` into `output_dir`.
#[tracing::instrument(
    skip_all,
    fields(input = %input.display(), output_dir = %output_dir.display(), gzip = gzip)
)]
pub async fn run_audit(
    input: &Path,
    output_dir: &Path,
    config: &AuditConfig,
    options: &ExecutionOptions,
    gzip: bool,
) -> Result<AuditReport> {
    std::fs::create_dir_all(output_dir)?;

    let table = read_trips(input)?.with_derived_metrics();
    let outcome = audit_chunked(table, config, options).await?;
    let report = outcome.report(config);

    output::log_rule_counts(&outcome.rule_counts);
    output::log_zone_report(&report.zone);
    output::log_summary(&report.summary);

    output::write_table(&output_dir.join(output::CLEAN_FILE), outcome.clean(), gzip)?;
    output::write_ghost_table(
        &output_dir.join(output::GHOST_FILE),
        &outcome.ghost,
        &outcome.ghost_rules,
        gzip,
    )?;
    output::write_annotated_table(
        &output_dir.join(output::ANNOTATED_FILE),
        &outcome.annotated,
        gzip,
    )?;
    output::write_report(&output_dir.join(output::REPORT_FILE), &report)?;

    info!(
        clean = outcome.clean().len(),
        ghost = outcome.ghost.len(),
        "Audit complete"
    );
    Ok(report)
}

/// Loads `input`, classifies it and writes only the clean and ghost tables.
#[tracing::instrument(
    skip_all,
    fields(input = %input.display(), output_dir = %output_dir.display(), gzip = gzip)
)]
pub fn run_classify(input: &Path, output_dir: &Path, gzip: bool) -> Result<RuleCounts> {
    std::fs::create_dir_all(output_dir)?;

    let table = read_trips(input)?.with_derived_metrics();
    let classification = classify(table)?;
    output::log_rule_counts(&classification.counts);

    output::write_table(&output_dir.join(output::CLEAN_FILE), &classification.clean, gzip)?;
    output::write_ghost_table(
        &output_dir.join(output::GHOST_FILE),
        &classification.ghost,
        &classification.ghost_rules,
        gzip,
    )?;

    Ok(classification.counts)
}
