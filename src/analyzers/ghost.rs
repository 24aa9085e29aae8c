//! Rule-based ghost trip detection.
//!
//! Each rule is a pure predicate over one record. A trip is a ghost when any
//! rule fires; the rules it fired are kept for attribution.
//!
//! Null inputs never satisfy a comparison, so a record with an unknown speed
//! is not caught by the speed rule. A non-finite speed (a zero-duration trip
//! divided out upstream) is treated the same way: such trips can still be
//! caught by the teleporter rule (short and expensive) or the stationary
//! rule (zero distance).

use std::fmt;

use serde::Serialize;

use crate::analyzers::types::RuleCounts;
use crate::table::{Column, TableError, TripRecord, TripTable};

pub const MAX_PLAUSIBLE_SPEED_MPH: f64 = 65.0;
pub const TELEPORT_MAX_MINUTES: f64 = 1.0;
pub const TELEPORT_MIN_FARE: f64 = 20.0;

/// Columns the rules read.
pub const REQUIRED_COLUMNS: [Column; 4] = [
    Column::AvgSpeed,
    Column::TripDuration,
    Column::Fare,
    Column::TripDistance,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostRule {
    /// Average speed above 65 mph.
    ImpossibleSpeed,
    /// Under a minute long with a fare above $20.
    Teleporter,
    /// Zero distance with a positive fare.
    Stationary,
}

impl GhostRule {
    pub const ALL: [GhostRule; 3] = [
        GhostRule::ImpossibleSpeed,
        GhostRule::Teleporter,
        GhostRule::Stationary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GhostRule::ImpossibleSpeed => "impossible_speed",
            GhostRule::Teleporter => "teleporter",
            GhostRule::Stationary => "stationary",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GhostRule::ImpossibleSpeed => "Impossible speed (>65 MPH)",
            GhostRule::Teleporter => "Teleporter (<1 min, >$20)",
            GhostRule::Stationary => "Stationary (0 mi, >$0)",
        }
    }

    pub fn matches(self, trip: &TripRecord) -> bool {
        match self {
            GhostRule::ImpossibleSpeed => trip
                .avg_speed
                .is_some_and(|speed| speed.is_finite() && speed > MAX_PLAUSIBLE_SPEED_MPH),
            GhostRule::Teleporter => {
                trip.trip_duration.is_some_and(|d| d < TELEPORT_MAX_MINUTES)
                    && trip.fare.is_some_and(|f| f > TELEPORT_MIN_FARE)
            }
            GhostRule::Stationary => {
                trip.trip_distance.is_some_and(|d| d == 0.0) && trip.fare.is_some_and(|f| f > 0.0)
            }
        }
    }
}

impl fmt::Display for GhostRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every rule `trip` triggers, in [`GhostRule::ALL`] order.
pub fn triggered_rules(trip: &TripRecord) -> Vec<GhostRule> {
    GhostRule::ALL
        .into_iter()
        .filter(|rule| rule.matches(trip))
        .collect()
}

/// Renders a rule list as a `|`-separated column value.
pub fn format_rules(rules: &[GhostRule]) -> String {
    rules
        .iter()
        .map(|r| r.name())
        .collect::<Vec<_>>()
        .join("|")
}

/// The two halves of a classified table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub clean: TripTable,
    pub ghost: TripTable,
    /// Rules fired by each ghost record, parallel to `ghost`.
    pub ghost_rules: Vec<Vec<GhostRule>>,
    pub counts: RuleCounts,
}

impl Classification {
    pub fn ghost_trips(&self) -> impl Iterator<Item = (&TripRecord, &[GhostRule])> {
        self.ghost
            .iter()
            .zip(self.ghost_rules.iter().map(Vec::as_slice))
    }
}

/// Splits `table` into clean and ghost trips.
///
/// Every record lands in exactly one half, keeping input order.
///
/// # Errors
///
/// Fails before inspecting any record if a rule column is missing.
pub fn classify(table: TripTable) -> Result<Classification, TableError> {
    table.require("ghost detection", &REQUIRED_COLUMNS)?;

    let mut counts = RuleCounts::default();
    let mut clean = Vec::new();
    let mut ghost = Vec::new();
    let mut ghost_rules = Vec::new();

    let empty = table.with_records(Vec::new());
    for trip in table.into_records() {
        let rules = triggered_rules(&trip);
        counts.record(&rules);
        if rules.is_empty() {
            clean.push(trip);
        } else {
            ghost.push(trip);
            ghost_rules.push(rules);
        }
    }

    Ok(Classification {
        clean: empty.with_records(clean),
        ghost: empty.with_records(ghost),
        ghost_rules,
        counts,
    })
}
