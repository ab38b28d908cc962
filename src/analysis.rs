use std::collections::BTreeMap;

use itertools::Itertools;
use itertools::MinMaxResult;

use super::demand::ZoneId;
use super::fitness::hourly_departure_histogram;
use super::geometry::Point2d;
use super::trip_chain::ActivityType;
use super::trip_chain::PlanElement;
use super::trip_chain::TripChainRecord;
use super::zones::ZoneRegistry;


/// Descriptive numbers for a population, used in run logs and reports.
#[derive(PartialEq, Debug, Clone)]
pub struct PopulationStatistics {
    pub num_travelers: usize,
    pub num_activities: usize,
    pub num_legs: usize,
    pub num_invalid: usize,
    pub num_inconsistent: usize,
    // chains other than origin, leg, destination, leg, return
    pub num_non_canonical: usize,
    pub activity_counts: BTreeMap<ActivityType, usize>,
    pub leg_modes: BTreeMap<String, usize>,
    pub coordinates_by_type: BTreeMap<ActivityType, Vec<Point2d>>,
    // lower-left and upper-right corners of all activity coordinates
    pub bounds: Option<(Point2d, Point2d)>,
    pub departure_range_s: Option<(f64, f64)>,
    pub hourly_departures: BTreeMap<u32, f64>,
}

impl PopulationStatistics {
    pub fn from_population(population: &[TripChainRecord]) -> PopulationStatistics {
        let mut activity_counts = BTreeMap::new();
        let mut coordinates_by_type: BTreeMap<ActivityType, Vec<Point2d>> = BTreeMap::new();
        let mut leg_modes = BTreeMap::new();
        let mut num_activities = 0;
        let mut num_legs = 0;
        for element in population.iter().flat_map(|pp| pp.elements().iter()) {
            match element {
                PlanElement::Activity(act) => {
                    num_activities += 1;
                    *activity_counts.entry(act.act_type).or_insert(0) += 1;
                    coordinates_by_type.entry(act.act_type).or_insert(vec![]).push(act.coord);
                }
                PlanElement::Leg(leg) => {
                    num_legs += 1;
                    *leg_modes.entry(leg.mode.clone()).or_insert(0) += 1;
                }
            }
        }

        let coords = || population.iter().flat_map(|pp| pp.activities()).map(|act| act.coord);
        let bounds = match (range(coords().map(|cc| cc.x_coord)),
                            range(coords().map(|cc| cc.y_coord))) {
            (Some((min_x, max_x)), Some((min_y, max_y))) => {
                Some((Point2d::new(min_x, min_y), Point2d::new(max_x, max_y)))
            }
            _ => None,
        };
        let departure_range_s = range(population.iter().filter_map(|pp| pp.departure_time_s()));

        PopulationStatistics {
            num_travelers: population.len(),
            num_activities,
            num_legs,
            num_invalid: population.iter().filter(|pp| !pp.is_well_formed()).count(),
            num_inconsistent: population.iter()
                .filter(|pp| pp.is_well_formed() && !pp.is_chain_consistent())
                .count(),
            num_non_canonical: population.iter().filter(|pp| !pp.is_canonical()).count(),
            activity_counts,
            leg_modes,
            coordinates_by_type,
            bounds,
            departure_range_s,
            hourly_departures: hourly_departure_histogram(population),
        }
    }

    /// True if every traveler has a canonical round-trip chain.
    pub fn is_structurally_valid(&self) -> bool {
        self.num_non_canonical == 0
    }

    /// The hour with the most departures; the earliest such hour on ties.
    pub fn peak_hour(&self) -> Option<u32> {
        self.hourly_departures.iter()
            .fold(None, |best: Option<(u32, f64)>, (hour, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((*hour, *count)),
            })
            .map(|(hour, _)| hour)
    }

    pub fn log_summary(&self, label: &str) {
        log::info!("{}: {} travelers, {} activities, {} legs", label, self.num_travelers,
                   self.num_activities, self.num_legs);
        if let Some((low, high)) = &self.bounds {
            log::info!("{}: activities span ({:.0}, {:.0}) to ({:.0}, {:.0})", label,
                       low.x_coord, low.y_coord, high.x_coord, high.y_coord);
        }
        if let Some((first, last)) = self.departure_range_s {
            log::info!("{}: departures from {:.0} s to {:.0} s, peak hour {:?}", label, first,
                       last, self.peak_hour());
        }
        if self.num_invalid > 0 || self.num_inconsistent > 0 {
            log::warn!("{}: {} malformed and {} inconsistent trip chains", label,
                       self.num_invalid, self.num_inconsistent);
        }
        if !self.is_structurally_valid() {
            log::warn!("{}: {} travelers do not follow the round-trip structure", label,
                       self.num_non_canonical);
        }
    }
}

/// Per activity type, how many activities lie nearest to each zone.
pub fn zone_distribution_by_type(population: &[TripChainRecord], zones: &ZoneRegistry)
                                 -> BTreeMap<ActivityType, BTreeMap<ZoneId, f64>> {
    let mut distribution: BTreeMap<ActivityType, BTreeMap<ZoneId, f64>> = BTreeMap::new();
    for act in population.iter().flat_map(|pp| pp.activities()) {
        if let Some(zone) = zones.nearest_zone(&act.coord) {
            *distribution.entry(act.act_type).or_insert(BTreeMap::new())
                .entry(zone).or_insert(0.) += 1.;
        }
    }
    distribution
}

fn range<I: Iterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    match values.minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(value) => Some((value, value)),
        MinMaxResult::MinMax(low, high) => Some((low, high)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::spatial::activity_zone_counts;
    use crate::test_utils::grid_population;
    use crate::test_utils::real_time_trip;
    use crate::trip_chain::Activity;
    use crate::trip_chain::Leg;
    use crate::trip_chain::DEFAULT_LEG_MODE;
    use crate::zones::SyntheticGrid;

    fn hours(hh: f64) -> f64 {
        hh * 3600.
    }

    /// Four round trips (one of them leaving its destination too early), a chain that stops at
    /// the destination, and a chain that ends on a leg.
    fn mixed_population() -> Vec<TripChainRecord> {
        let home = Point2d::new(0., 0.);
        let work = Point2d::new(1000., 0.);
        let mut late = TripChainRecord::round_trip("late", home, work, hours(9.),
                                                   DEFAULT_LEG_MODE);
        late.activity_at_mut(2).unwrap().end_time_s = Some(hours(9.) + 600.);
        let one_way = TripChainRecord::new("one_way", vec![
            PlanElement::Activity(Activity::new(ActivityType::Origin, home,
                                                Some(hours(8.5)))),
            PlanElement::Leg(Leg::new(DEFAULT_LEG_MODE)),
            PlanElement::Activity(Activity::new(ActivityType::Destination, work, None)),
        ]);
        let broken = TripChainRecord::new("broken", vec![
            PlanElement::Activity(Activity::new(ActivityType::Origin, home,
                                                Some(hours(7.) + 1200.))),
            PlanElement::Leg(Leg::new("walk")),
        ]);
        vec![
            TripChainRecord::round_trip("a", home, work, hours(7.) + 600., DEFAULT_LEG_MODE),
            TripChainRecord::round_trip("b", home, work, hours(7.) + 2400., DEFAULT_LEG_MODE),
            TripChainRecord::round_trip("c", work, home, hours(8.25), DEFAULT_LEG_MODE),
            late,
            one_way,
            broken,
        ]
    }

    #[test]
    fn test_statistics_of_round_trips() {
        let mut population = grid_population(50, 4);
        population.push(TripChainRecord::round_trip("late", Point2d::new(0., 0.),
                                                    Point2d::new(10., 10.), 20. * 3600.,
                                                    DEFAULT_LEG_MODE));
        let stats = PopulationStatistics::from_population(&population);

        assert_eq!(stats.num_travelers, 51);
        assert_eq!(stats.num_activities, 153);
        assert_eq!(stats.num_legs, 102);
        assert_eq!(stats.activity_counts[&ActivityType::Origin], 102);
        assert_eq!(stats.activity_counts[&ActivityType::Destination], 51);
        assert_eq!(stats.leg_modes[DEFAULT_LEG_MODE], 102);
        assert_eq!(stats.num_invalid, 0);
        assert_eq!(stats.num_inconsistent, 0);

        let (low, high) = stats.bounds.unwrap();
        assert_eq!(low, Point2d::new(0., 0.));
        assert!(high.x_coord > 940_000.);
        let (first, last) = stats.departure_range_s.unwrap();
        assert!(first >= 10. * 3600.);
        assert_eq!(last, 20. * 3600.);
        assert_eq!(stats.hourly_departures.values().sum::<f64>(), 51.);
    }

    #[test]
    fn test_empty_population() {
        let stats = PopulationStatistics::from_population(&[]);
        assert_eq!(stats.num_travelers, 0);
        assert_eq!(stats.bounds, None);
        assert_eq!(stats.departure_range_s, None);
        assert_eq!(stats.peak_hour(), None);
    }

    #[test]
    fn test_peak_hour_prefers_earliest() {
        let mut stats = PopulationStatistics::from_population(&[]);
        stats.hourly_departures = vec![(7, 10.), (8, 12.), (17, 12.)].into_iter().collect();
        assert_eq!(stats.peak_hour(), Some(8));
    }

    #[test]
    fn test_statistics_flag_broken_chains() {
        let stats = PopulationStatistics::from_population(&mixed_population());

        assert_eq!(stats.num_travelers, 6);
        assert_eq!(stats.num_activities, 15);
        assert_eq!(stats.num_legs, 10);
        assert_eq!(stats.num_invalid, 1);
        assert_eq!(stats.num_inconsistent, 1);
        assert_eq!(stats.num_non_canonical, 2);
        assert!(!stats.is_structurally_valid());
        assert_eq!(stats.leg_modes["walk"], 1);
        assert_eq!(stats.leg_modes[DEFAULT_LEG_MODE], 9);

        // departures of malformed chains are still counted
        assert_eq!(stats.hourly_departures[&7], 3.);
        assert_eq!(stats.hourly_departures[&8], 2.);
        assert_eq!(stats.hourly_departures[&9], 1.);
        assert_eq!(stats.peak_hour(), Some(7));
        assert_eq!(stats.departure_range_s, Some((hours(7.) + 600., hours(9.))));

        let origins = &stats.coordinates_by_type[&ActivityType::Origin];
        let destinations = &stats.coordinates_by_type[&ActivityType::Destination];
        assert_eq!(origins.len(), 10);
        assert_eq!(destinations.len(), 5);
        assert_eq!(destinations.iter().filter(|cc| **cc == Point2d::new(1000., 0.)).count(), 4);
    }

    #[test]
    fn test_canonical_population_is_structurally_valid() {
        let stats = PopulationStatistics::from_population(&grid_population(10, 8));
        assert_eq!(stats.num_non_canonical, 0);
        assert!(stats.is_structurally_valid());
    }

    #[test]
    fn test_zone_distribution_by_type() {
        let trips = vec![
            real_time_trip(1, 2, Point2d::new(0., 0.), Point2d::new(1000., 0.), hours(8.)),
        ];
        let zones = ZoneRegistry::build(&BTreeSet::new(), &trips, &SyntheticGrid::default());
        let population = mixed_population();
        let distribution = zone_distribution_by_type(&population, &zones);

        let origins = &distribution[&ActivityType::Origin];
        assert_eq!(origins[&1], 8.);
        assert_eq!(origins[&2], 2.);
        let destinations = &distribution[&ActivityType::Destination];
        assert_eq!(destinations[&1], 1.);
        assert_eq!(destinations[&2], 4.);

        // summed over types, this is the per-zone activity count
        let mut totals: BTreeMap<ZoneId, f64> = BTreeMap::new();
        for counts in distribution.values() {
            for (zone, count) in counts {
                *totals.entry(*zone).or_insert(0.) += count;
            }
        }
        assert_eq!(totals, activity_zone_counts(&population, &zones));
    }
}
