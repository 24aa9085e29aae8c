//! Descriptive statistics over a trip table: headline totals, an hourly
//! profile and the busiest pickup locations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::analyzers::utility::{merge_counts, ratio, top_k};
use crate::table::{TripRecord, TripTable};

/// How many pickup locations [`SummaryStats::top_pickups`] lists.
pub const TOP_PICKUPS: usize = 10;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub total_trips: u64,
    pub avg_fare: f64,
    pub avg_distance: f64,
    /// Mean over finite speeds only.
    pub avg_speed: f64,
    pub total_revenue: f64,
    pub total_congestion_surcharge: f64,
    pub hourly: Vec<HourlyBucket>,
    pub top_pickups: Vec<LocationCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub hour: u32,
    pub trips: u64,
    pub avg_distance: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationCount {
    pub pickup_loc: u32,
    pub trips: u64,
}

/// Sum and count of the non-null observations of one value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Moment {
    sum: f64,
    n: u64,
}

impl Moment {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.n += 1;
        }
    }

    fn merge(&mut self, other: &Moment) {
        self.sum += other.sum;
        self.n += other.n;
    }

    fn mean(&self) -> f64 {
        ratio(self.sum, self.n)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct HourAccumulator {
    trips: u64,
    distance: Moment,
    revenue: f64,
}

/// Mergeable partial statistics. Build one per chunk, merge, then
/// [`finish`](StatsAccumulator::finish).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsAccumulator {
    trips: u64,
    fare: Moment,
    distance: Moment,
    speed: Moment,
    revenue: f64,
    surcharge: f64,
    hourly: BTreeMap<u32, HourAccumulator>,
    pickups: HashMap<u32, u64>,
}

impl StatsAccumulator {
    pub fn add(&mut self, trip: &TripRecord) {
        self.trips += 1;
        self.fare.add(trip.fare);
        self.distance.add(trip.trip_distance);
        self.speed.add(trip.avg_speed);
        self.revenue += trip.total_amount.filter(|v| v.is_finite()).unwrap_or(0.0);
        self.surcharge += trip
            .congestion_surcharge
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);

        if let Some(hour) = trip.pickup_hour() {
            let bucket = self.hourly.entry(hour).or_default();
            bucket.trips += 1;
            bucket.distance.add(trip.trip_distance);
            bucket.revenue += trip.total_amount.filter(|v| v.is_finite()).unwrap_or(0.0);
        }

        if let Some(loc) = trip.pickup_loc {
            *self.pickups.entry(loc).or_default() += 1;
        }
    }

    pub fn merge(&mut self, other: &StatsAccumulator) {
        self.trips += other.trips;
        self.fare.merge(&other.fare);
        self.distance.merge(&other.distance);
        self.speed.merge(&other.speed);
        self.revenue += other.revenue;
        self.surcharge += other.surcharge;
        for (hour, theirs) in &other.hourly {
            let ours = self.hourly.entry(*hour).or_default();
            ours.trips += theirs.trips;
            ours.distance.merge(&theirs.distance);
            ours.revenue += theirs.revenue;
        }
        merge_counts(&mut self.pickups, &other.pickups);
    }

    pub fn finish(&self) -> SummaryStats {
        SummaryStats {
            total_trips: self.trips,
            avg_fare: self.fare.mean(),
            avg_distance: self.distance.mean(),
            avg_speed: self.speed.mean(),
            total_revenue: self.revenue,
            total_congestion_surcharge: self.surcharge,
            hourly: self
                .hourly
                .iter()
                .map(|(&hour, b)| HourlyBucket {
                    hour,
                    trips: b.trips,
                    avg_distance: b.distance.mean(),
                    revenue: b.revenue,
                })
                .collect(),
            top_pickups: top_k(&self.pickups, TOP_PICKUPS)
                .into_iter()
                .map(|(pickup_loc, trips)| LocationCount { pickup_loc, trips })
                .collect(),
        }
    }
}

impl SummaryStats {
    pub fn from_table(table: &TripTable) -> Self {
        let mut acc = StatsAccumulator::default();
        for trip in table {
            acc.add(trip);
        }
        acc.finish()
    }

    pub fn pct(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(hour: u32, pickup: u32, fare: f64, distance: f64, total: f64) -> TripRecord {
        TripRecord {
            pickup_time: NaiveDate::from_ymd_opt(2025, 1, 10)
                .unwrap()
                .and_hms_opt(hour, 15, 0),
            pickup_loc: Some(pickup),
            fare: Some(fare),
            trip_distance: Some(distance),
            total_amount: Some(total),
            congestion_surcharge: Some(2.5),
            avg_speed: Some(12.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(SummaryStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(SummaryStats::pct(50, 100), 50.0);
        assert_eq!(SummaryStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_from_table_empty() {
        let stats = SummaryStats::from_table(&TripTable::default());
        assert_eq!(stats.total_trips, 0);
        assert_eq!(stats.avg_fare, 0.0);
        assert!(stats.hourly.is_empty());
        assert!(stats.top_pickups.is_empty());
    }

    #[test]
    fn test_from_table_totals() {
        let table = TripTable::with_all_columns(vec![
            trip(8, 161, 10.0, 2.0, 15.0),
            trip(8, 161, 20.0, 4.0, 27.0),
            trip(17, 236, 30.0, 6.0, 40.0),
        ]);
        let stats = SummaryStats::from_table(&table);

        assert_eq!(stats.total_trips, 3);
        assert_eq!(stats.avg_fare, 20.0);
        assert_eq!(stats.avg_distance, 4.0);
        assert_eq!(stats.avg_speed, 12.0);
        assert_eq!(stats.total_revenue, 82.0);
        assert_eq!(stats.total_congestion_surcharge, 7.5);
        assert_eq!(
            stats.hourly,
            vec![
                HourlyBucket {
                    hour: 8,
                    trips: 2,
                    avg_distance: 3.0,
                    revenue: 42.0,
                },
                HourlyBucket {
                    hour: 17,
                    trips: 1,
                    avg_distance: 6.0,
                    revenue: 40.0,
                },
            ]
        );
        assert_eq!(
            stats.top_pickups,
            vec![
                LocationCount {
                    pickup_loc: 161,
                    trips: 2,
                },
                LocationCount {
                    pickup_loc: 236,
                    trips: 1,
                },
            ]
        );
    }

    #[test]
    fn test_nulls_and_non_finite_are_skipped() {
        let mut odd = trip(3, 1, 10.0, 1.0, 10.0);
        odd.fare = None;
        odd.avg_speed = Some(f64::INFINITY);
        let table = TripTable::with_all_columns(vec![odd, trip(3, 1, 30.0, 1.0, 10.0)]);
        let stats = SummaryStats::from_table(&table);

        assert_eq!(stats.avg_fare, 30.0);
        assert_eq!(stats.avg_speed, 12.0);
    }

    #[test]
    fn test_accumulator_merge_matches_single_pass() {
        let trips = vec![
            trip(1, 10, 5.0, 1.0, 6.0),
            trip(1, 11, 7.0, 2.0, 9.0),
            trip(2, 10, 9.0, 3.0, 12.0),
            trip(23, 12, 11.0, 4.0, 14.0),
        ];

        let mut whole = StatsAccumulator::default();
        trips.iter().for_each(|t| whole.add(t));

        let mut left = StatsAccumulator::default();
        let mut right = StatsAccumulator::default();
        trips[..2].iter().for_each(|t| left.add(t));
        trips[2..].iter().for_each(|t| right.add(t));
        right.merge(&left);

        assert_eq!(right, whole);
    }
}
