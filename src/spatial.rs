use std::collections::BTreeMap;
use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

use super::demand::DemandPattern;
use super::demand::ZoneId;
use super::fitness::normalized_rmse_fitness;
use super::sampling::bernoulli;
use super::sampling::jitter_in_disc;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;
use super::zones::ZoneRegistry;
use super::zones::ZoneRole;

/// Destinations reachable from each origin zone, each repeated in proportion to its volume.
pub type OdMapping = BTreeMap<ZoneId, Vec<ZoneId>>;

#[derive(PartialEq, Debug, Clone)]
pub struct SpatialSummary {
    pub method: &'static str,
    pub spatial_fitness: f64,
    pub zones_used: usize,
    pub travelers_reallocated: usize,
    pub activities_reallocated: usize,
    pub actual_distribution: BTreeMap<ZoneId, f64>,
    pub expected_distribution: BTreeMap<ZoneId, f64>,
    // empty unless the scenario concentrates demand
    pub high_demand_zones: BTreeSet<ZoneId>,
}

pub struct SpatialReallocationResult {
    pub population: Population,
    pub summary: SpatialSummary,
}

/// Moves activities into zones drawn from a pattern's OD volumes.
#[derive(PartialEq, Debug, Clone)]
pub struct SpatialReallocator {
    pub zone_radius_m: f64,
    pub allocation_probability: f64,
}

impl Default for SpatialReallocator {
    fn default() -> SpatialReallocator {
        SpatialReallocator {
            zone_radius_m: 500.,
            allocation_probability: 1.,
        }
    }
}

impl SpatialReallocator {
    pub fn reallocate<R: Rng + ?Sized>(&self, population: &[TripChainRecord],
                                       pattern: &DemandPattern, zones: &ZoneRegistry,
                                       rng: &mut R) -> SpatialReallocationResult {
        let mut reallocated: Population = population.iter()
            .map(|pp| pp.clone_with_id(pp.get_id()))
            .collect();

        let full_mapping = od_mapping(pattern);
        let mut high_demand_zones = BTreeSet::new();
        let mut probability = self.allocation_probability;
        let mut mapping = full_mapping;
        if let Some(conc) = pattern.scenario.concentration() {
            high_demand_zones = high_demand_zone_set(pattern, conc.threshold);
            let restricted = restrict_mapping(&mapping, &high_demand_zones);
            if restricted.is_empty() {
                log::warn!("{}: no OD pair joins two high-demand zones, using the full mapping",
                           pattern.id);
            } else {
                mapping = restricted;
            }
            probability = conc.allocation_probability;
        }

        let mut travelers_reallocated = 0;
        let mut activities_reallocated = 0;
        let origins: Vec<ZoneId> = mapping.keys().cloned().collect();
        if origins.is_empty() {
            log::warn!("{}: pattern has no OD volume, activities keep their locations",
                       pattern.id);
        } else {
            for person in reallocated.iter_mut().filter(|pp| pp.is_canonical()) {
                if !bernoulli(rng, probability) {
                    continue;
                }
                let origin_zone = origins[rng.gen_range(0..origins.len())];
                let dest_zone = match mapping.get(&origin_zone).and_then(|dd| dd.choose(rng)) {
                    Some(dest) => *dest,
                    None => continue,
                };
                activities_reallocated +=
                    self.relocate(person, origin_zone, dest_zone, zones, rng);
                travelers_reallocated += 1;
            }
        }

        let expected_distribution = pattern.zone_scores();
        let actual_distribution = activity_zone_counts(&reallocated, zones);
        let spatial_fitness = normalized_rmse_fitness(&expected_distribution,
                                                      &actual_distribution);
        log::info!("{}: reallocated {} travelers, spatial fitness {:.3}", pattern.id,
                   travelers_reallocated, spatial_fitness);

        SpatialReallocationResult {
            population: reallocated,
            summary: SpatialSummary {
                method: pattern.scenario.spatial_method(),
                spatial_fitness,
                zones_used: actual_distribution.len(),
                travelers_reallocated,
                activities_reallocated,
                actual_distribution,
                expected_distribution,
                high_demand_zones,
            },
        }
    }

    /// Place the origin and destination activities near observed points of their zones. The
    /// return activity goes back to the origin point. Returns the number of activities moved.
    fn relocate<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, origin_zone: ZoneId,
                                 dest_zone: ZoneId, zones: &ZoneRegistry, rng: &mut R)
                                 -> usize {
        let origin_anchor = zones.sample_coordinate(origin_zone, ZoneRole::Origin, rng);
        let origin_point = jitter_in_disc(rng, &origin_anchor, self.zone_radius_m);
        let dest_anchor = zones.sample_coordinate(dest_zone, ZoneRole::Destination, rng);
        let dest_point = jitter_in_disc(rng, &dest_anchor, self.zone_radius_m);

        let mut moved = 0;
        for (ei, point) in &[(0, origin_point), (2, dest_point), (4, origin_point)] {
            if let Some(act) = person.activity_at_mut(*ei) {
                act.coord = *point;
                moved += 1;
            }
        }
        moved
    }
}

pub fn od_mapping(pattern: &DemandPattern) -> OdMapping {
    let mut mapping: OdMapping = BTreeMap::new();
    for ((orig, dest, _), volume) in pattern.od_volumes() {
        if *volume <= 0. {
            continue;
        }
        let weight = (volume.round() as usize).max(1);
        let dests = mapping.entry(*orig).or_insert(vec![]);
        dests.extend(std::iter::repeat(*dest).take(weight));
    }
    mapping
}

/// Zones whose demand score is at least `threshold` times the best zone's score.
pub fn high_demand_zone_set(pattern: &DemandPattern, threshold: f64) -> BTreeSet<ZoneId> {
    let scores = pattern.zone_scores();
    let max_score = scores.values().cloned().fold(0., f64::max);
    scores.into_iter()
        .filter(|(_, score)| *score >= max_score * threshold)
        .map(|(zone, _)| zone)
        .collect()
}

/// Keep only the entries whose origin and destination are both in `kept`.
pub fn restrict_mapping(mapping: &OdMapping, kept: &BTreeSet<ZoneId>) -> OdMapping {
    mapping.iter()
        .filter(|(orig, _)| kept.contains(*orig))
        .map(|(orig, dests)| {
            let dests: Vec<ZoneId> = dests.iter()
                .filter(|dd| kept.contains(*dd))
                .cloned()
                .collect();
            (*orig, dests)
        })
        .filter(|(_, dests)| !dests.is_empty())
        .collect()
}

/// How many activities lie nearest to each zone.
pub fn activity_zone_counts(population: &[TripChainRecord], zones: &ZoneRegistry)
                            -> BTreeMap<ZoneId, f64> {
    let mut counts = BTreeMap::new();
    for act in population.iter().flat_map(|pp| pp.activities()) {
        if let Some(zone) = zones.nearest_zone(&act.coord) {
            *counts.entry(zone).or_insert(0.) += 1.;
        }
    }
    counts
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2d;
    use crate::rules::PatternId;
    use crate::sampling::seeded_rng;
    use crate::test_utils::grid_population;
    use crate::test_utils::real_time_trip;
    use crate::zones::SyntheticGrid;

    fn three_zone_pattern(scenario: &str) -> DemandPattern {
        let mut pattern = DemandPattern::new(PatternId::new(scenario, 1.0, 1));
        pattern.add_demand(1, 2, 8, 40.);
        pattern.add_demand(2, 1, 17, 35.);
        pattern.add_demand(3, 1, 8, 2.);
        pattern.add_demand(3, 3, 9, 0.3);
        pattern
    }

    fn registry_for(pattern: &DemandPattern) -> ZoneRegistry {
        let trips = vec![
            real_time_trip(1, 2, Point2d::new(0., 0.), Point2d::new(5000., 0.), 8. * 3600.),
            real_time_trip(2, 1, Point2d::new(5000., 0.), Point2d::new(0., 0.), 17. * 3600.),
            real_time_trip(3, 1, Point2d::new(0., 5000.), Point2d::new(0., 0.), 8. * 3600.),
        ];
        ZoneRegistry::for_pattern(pattern, &trips, &SyntheticGrid::default())
    }

    #[test]
    fn test_od_mapping_weights() {
        let mapping = od_mapping(&three_zone_pattern("base"));
        assert_eq!(mapping[&1].len(), 40);
        assert!(mapping[&1].iter().all(|dd| *dd == 2));
        assert_eq!(mapping[&3], vec![1, 1, 3]);
    }

    #[test]
    fn test_concentration_keeps_busy_zones() {
        let pattern = three_zone_pattern("S2");
        let high = high_demand_zone_set(&pattern, 0.7);
        assert_eq!(high.iter().cloned().collect::<Vec<_>>(), vec![1, 2]);

        let restricted = restrict_mapping(&od_mapping(&pattern), &high);
        assert!(!restricted.contains_key(&3));
        assert_eq!(restricted[&2].len(), 35);
    }

    #[test]
    fn test_reallocation_moves_activities_into_zones() {
        let pattern = three_zone_pattern("base");
        let registry = registry_for(&pattern);
        let base = grid_population(200, 17);
        let result = SpatialReallocator::default()
            .reallocate(&base, &pattern, &registry, &mut seeded_rng(2));

        assert_eq!(result.population.len(), 200);
        assert_eq!(result.summary.travelers_reallocated, 200);
        assert_eq!(result.summary.activities_reallocated, 600);
        assert_eq!(result.summary.method, "BASE_ZONE_DISTRIBUTION");
        for (before, after) in base.iter().zip(result.population.iter()) {
            assert_eq!(before.get_id(), after.get_id());
            assert!(after.is_canonical());
            assert!(after.is_chain_consistent());
            // timing is untouched
            assert_eq!(before.departure_time_s(), after.departure_time_s());
            let origin = after.activity_at(0).unwrap().coord;
            assert_eq!(after.activity_at(4).unwrap().coord, origin);
            let zone = registry.nearest_zone(&origin).unwrap();
            let anchor = registry.representative(zone, ZoneRole::Origin);
            assert!(origin.euclidean_distance(&anchor) <= 500. + 1e-6);
        }
        assert!(result.summary.spatial_fitness >= 0. && result.summary.spatial_fitness <= 1.);
        assert_eq!(result.summary.actual_distribution.values().sum::<f64>(), 600.);
        assert!(result.summary.high_demand_zones.is_empty());
    }

    #[test]
    fn test_concentrated_reallocation_avoids_quiet_zones() {
        let pattern = three_zone_pattern("S2");
        let registry = registry_for(&pattern);
        let base = grid_population(300, 23);
        let result = SpatialReallocator::default()
            .reallocate(&base, &pattern, &registry, &mut seeded_rng(9));

        assert_eq!(result.summary.method, "STRONG_SPATIAL_CONCENTRATION");
        assert!(result.summary.travelers_reallocated < 300);
        assert!(result.summary.travelers_reallocated > 240);
        let zone3 = result.population.iter()
            .zip(base.iter())
            .filter(|(after, before)| after != before)
            .flat_map(|(after, _)| after.activities())
            .filter(|act| registry.nearest_zone(&act.coord) == Some(3))
            .count();
        assert_eq!(zone3, 0);
    }

    #[test]
    fn test_non_canonical_chains_are_left_alone() {
        let pattern = three_zone_pattern("base");
        let registry = registry_for(&pattern);
        let mut base = grid_population(5, 1);
        let mut short = base[0].elements().clone();
        short.truncate(3);
        base.push(TripChainRecord::new("short", short));
        let result = SpatialReallocator::default()
            .reallocate(&base, &pattern, &registry, &mut seeded_rng(4));
        assert_eq!(result.population[5], base[5]);
        assert_eq!(result.summary.travelers_reallocated, 5);
    }
}
