//! Aggregate and report types shared by the analysis stages.
//!
//! The tallies here are built per chunk and combined with `merge`, which is
//! associative and commutative; rankings are derived only after merging.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use crate::analyzers::ghost::GhostRule;
use crate::analyzers::utility::{merge_counts, top_k};
use crate::stats::SummaryStats;

/// Per-rule trigger counts for one classification run.
///
/// A record triggering several rules is counted once per rule but only once
/// in `ghost`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleCounts {
    pub total: u64,
    pub ghost: u64,
    pub impossible_speed: u64,
    pub teleporter: u64,
    pub stationary: u64,
}

impl RuleCounts {
    /// Records one classified trip and the rules it triggered.
    pub fn record(&mut self, rules: &[GhostRule]) {
        self.total += 1;
        if rules.is_empty() {
            return;
        }
        self.ghost += 1;
        for rule in rules {
            match rule {
                GhostRule::ImpossibleSpeed => self.impossible_speed += 1,
                GhostRule::Teleporter => self.teleporter += 1,
                GhostRule::Stationary => self.stationary += 1,
            }
        }
    }

    pub fn count(&self, rule: GhostRule) -> u64 {
        match rule {
            GhostRule::ImpossibleSpeed => self.impossible_speed,
            GhostRule::Teleporter => self.teleporter,
            GhostRule::Stationary => self.stationary,
        }
    }

    pub fn clean(&self) -> u64 {
        self.total - self.ghost
    }

    /// Share of trips flagged as ghosts, 0.0 for an empty table.
    pub fn ghost_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.ghost as f64 / self.total as f64
        }
    }

    pub fn merge(&mut self, other: &RuleCounts) {
        self.total += other.total;
        self.ghost += other.ghost;
        self.impossible_speed += other.impossible_speed;
        self.teleporter += other.teleporter;
        self.stationary += other.stationary;
    }
}

/// Fraction of qualifying zone entries that were charged the surcharge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComplianceRate {
    Defined(f64),
    /// No trip qualified, so there is nothing to measure.
    Undefined,
}

impl ComplianceRate {
    pub fn from_counts(compliant: u64, qualifying: u64) -> Self {
        if qualifying == 0 {
            ComplianceRate::Undefined
        } else {
            ComplianceRate::Defined(compliant as f64 / qualifying as f64)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            ComplianceRate::Defined(rate) => Some(*rate),
            ComplianceRate::Undefined => None,
        }
    }
}

impl fmt::Display for ComplianceRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceRate::Defined(rate) => write!(f, "{:.2}%", rate * 100.0),
            ComplianceRate::Undefined => f.write_str("N/A"),
        }
    }
}

/// Serialized as the bare ratio, or `null` when undefined.
impl Serialize for ComplianceRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// A pickup location and how many uncharged zone entries started there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeakageEntry {
    pub pickup_loc: u32,
    pub trips: u64,
}

/// Running compliance counts over qualifying trips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceTally {
    pub qualifying: u64,
    pub compliant: u64,
    /// Uncharged qualifying trips by pickup location. Trips with an unknown
    /// pickup location count toward `qualifying` but are not ranked.
    pub leakage_by_pickup: HashMap<u32, u64>,
}

impl ComplianceTally {
    /// Records one qualifying trip. Only a positive surcharge is compliant.
    pub fn record(&mut self, pickup_loc: Option<u32>, congestion_surcharge: Option<f64>) {
        self.qualifying += 1;
        if congestion_surcharge.is_some_and(|s| s > 0.0) {
            self.compliant += 1;
        } else if let Some(loc) = pickup_loc {
            *self.leakage_by_pickup.entry(loc).or_default() += 1;
        }
    }

    pub fn non_compliant(&self) -> u64 {
        self.qualifying - self.compliant
    }

    pub fn rate(&self) -> ComplianceRate {
        ComplianceRate::from_counts(self.compliant, self.qualifying)
    }

    /// The `k` pickup locations leaking the most trips.
    pub fn leakage(&self, k: usize) -> Vec<LeakageEntry> {
        top_k(&self.leakage_by_pickup, k)
            .into_iter()
            .map(|(pickup_loc, trips)| LeakageEntry { pickup_loc, trips })
            .collect()
    }

    pub fn merge(&mut self, other: &ComplianceTally) {
        self.qualifying += other.qualifying;
        self.compliant += other.compliant;
        merge_counts(&mut self.leakage_by_pickup, &other.leakage_by_pickup);
    }

    pub fn report(&self, cutoff: NaiveDate, k: usize) -> ZoneReport {
        ZoneReport {
            cutoff,
            zone_entries: self.qualifying,
            compliant: self.compliant,
            compliance_rate: self.rate(),
            leakage: self.leakage(k),
        }
    }
}

/// Compliance results for trips entering the zone on or after `cutoff`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneReport {
    pub cutoff: NaiveDate,
    pub zone_entries: u64,
    pub compliant: u64,
    pub compliance_rate: ComplianceRate,
    pub leakage: Vec<LeakageEntry>,
}

/// Everything an audit run produced except the tables, written as
/// `audit_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub schema_version: u8,
    pub generated_at: DateTime<Utc>,
    pub rule_counts: RuleCounts,
    pub ghost_fraction: f64,
    pub zone: ZoneReport,
    pub summary: SummaryStats,
}
