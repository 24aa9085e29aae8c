//! Congestion zone membership and surcharge compliance.

use serde::Serialize;

use crate::analyzers::types::{ComplianceTally, ZoneReport};
use crate::config::{AuditConfig, ZoneSet};
use crate::table::{Column, TableError, TripRecord, TripTable};

pub const REQUIRED_COLUMNS: [Column; 4] = [
    Column::PickupLoc,
    Column::DropoffLoc,
    Column::PickupTime,
    Column::CongestionSurcharge,
];

/// Zone flags for one trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZoneMembership {
    pub pickup_in_zone: bool,
    pub dropoff_in_zone: bool,
    /// Started outside the zone and ended inside it.
    pub enters_zone: bool,
}

impl ZoneMembership {
    pub fn of(trip: &TripRecord, zones: &ZoneSet) -> Self {
        let pickup_in_zone = zones.contains(trip.pickup_loc);
        let dropoff_in_zone = zones.contains(trip.dropoff_loc);
        Self {
            pickup_in_zone,
            dropoff_in_zone,
            enters_zone: !pickup_in_zone && dropoff_in_zone,
        }
    }
}

/// A table with zone flags for each record, parallel to its records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedTable {
    pub table: TripTable,
    pub membership: Vec<ZoneMembership>,
}

impl AnnotatedTable {
    pub fn iter(&self) -> impl Iterator<Item = (&TripRecord, &ZoneMembership)> {
        self.table.iter().zip(self.membership.iter())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Output of the zone stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneAnalysis {
    pub annotated: AnnotatedTable,
    pub tally: ComplianceTally,
}

impl ZoneAnalysis {
    pub fn report(&self, config: &AuditConfig) -> ZoneReport {
        self.tally.report(config.cutoff, config.top_k)
    }
}

/// Whether a trip is a zone entry subject to the toll under `config`.
/// Trips without a pickup time never qualify.
pub fn qualifies(trip: &TripRecord, membership: &ZoneMembership, config: &AuditConfig) -> bool {
    membership.enters_zone && trip.pickup_time.is_some_and(|t| t.date() >= config.cutoff)
}

/// Flags every trip's zone membership and tallies compliance over the
/// qualifying set.
///
/// # Errors
///
/// Fails before inspecting any record if a required column is missing.
pub fn analyze_zone(table: TripTable, config: &AuditConfig) -> Result<ZoneAnalysis, TableError> {
    table.require("zone compliance", &REQUIRED_COLUMNS)?;

    let mut tally = ComplianceTally::default();
    let membership = table
        .iter()
        .map(|trip| {
            let flags = ZoneMembership::of(trip, &config.zones);
            if qualifies(trip, &flags, config) {
                tally.record(trip.pickup_loc, trip.congestion_surcharge);
            }
            flags
        })
        .collect();

    Ok(ZoneAnalysis {
        annotated: AnnotatedTable { table, membership },
        tally,
    })
}
