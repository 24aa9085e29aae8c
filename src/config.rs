//! Audit policy: which zones are tolled, from when, and how much leakage
//! to rank.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

/// Taxi zones in Manhattan south of 60th Street.
pub static CONGESTION_ZONE_IDS: &[u32] = &[
    4, 12, 13, 24, 41, 42, 43, 45, 48, 50, 68, 74, 75, 79, 87, 88, 90, 100, 103, 107, 113, 114,
    116, 120, 125, 127, 128, 137, 140, 141, 142, 143, 144, 148, 151, 152, 153, 158, 161, 162, 163,
    164, 166, 170, 186, 194, 202, 209, 211, 224, 229, 230, 231, 232, 233, 234, 236, 237, 238, 239,
    243, 244, 246, 249, 261, 262, 263,
];

pub const DEFAULT_TOP_K: usize = 3;

/// Start of congestion pricing.
pub fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 5).expect("2025-01-05 is a valid date")
}

/// An immutable set of zone identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSet {
    ids: BTreeSet<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZoneFile {
    List(Vec<u32>),
    Object { zones: Vec<u32> },
}

impl ZoneSet {
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// The congestion pricing zone.
    pub fn congestion_zone() -> Self {
        Self::new(CONGESTION_ZONE_IDS.iter().copied())
    }

    /// Loads a zone set from a JSON file, either a bare array or an object
    /// with a `zones` array:
    /// ```json
    /// { "zones": [4, 12, 13] }
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read zone file '{}'", path.display()))?;
        let file: ZoneFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse zone file '{}'", path.display()))?;

        let ids = match file {
            ZoneFile::List(ids) | ZoneFile::Object { zones: ids } => ids,
        };
        anyhow::ensure!(!ids.is_empty(), "zone file '{}' lists no zones", path.display());

        Ok(Self::new(ids))
    }

    /// Unknown locations are outside every zone.
    pub fn contains(&self, loc: Option<u32>) -> bool {
        loc.is_some_and(|id| self.ids.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }
}

impl Default for ZoneSet {
    fn default() -> Self {
        Self::congestion_zone()
    }
}

/// Parameters for the zone compliance analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    pub zones: ZoneSet,
    /// Trips picked up on or after this date are subject to the toll.
    pub cutoff: NaiveDate,
    /// Number of leakage locations to report.
    pub top_k: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            zones: ZoneSet::congestion_zone(),
            cutoff: default_cutoff(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl AuditConfig {
    pub fn with_zones(mut self, zones: ZoneSet) -> Self {
        self.zones = zones;
        self
    }

    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}
