use std::collections::BTreeMap;

use rand::Rng;

use super::demand::DemandPattern;
use super::rules::PerturbationFamily;
use super::sampling::bernoulli;
use super::sampling::gaussian;
use super::sampling::half_normal;
use super::sampling::random_angle;
use super::trip_chain::ActivityType;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;
use super::trip_chain::NOMINAL_ACTIVITIES;

pub static COMBINED_CATEGORY: &str = "combined_temporal_spatial";
pub static DEMAND_CATEGORY: &str = "demand_duration_change";

/// Reporting bucket for an absolute time shift in seconds.
pub fn time_shift_category(shift_s: f64) -> &'static str {
    let minutes = shift_s.abs() / 60.;
    if minutes < 5. {
        "shift_lt_5min"
    } else if minutes < 15. {
        "shift_5_15min"
    } else if minutes < 30. {
        "shift_15_30min"
    } else {
        "shift_gt_30min"
    }
}

/// Reporting bucket for a displacement in metres.
pub fn distance_category(distance_m: f64) -> &'static str {
    if distance_m < 100. {
        "dist_lt_100m"
    } else if distance_m < 300. {
        "dist_100_300m"
    } else if distance_m < 500. {
        "dist_300_500m"
    } else {
        "dist_gt_500m"
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct PerturbationSummary {
    pub method: &'static str,
    pub family: PerturbationFamily,
    pub temporal_perturbations: usize,
    pub spatial_perturbations: usize,
    pub demand_perturbations: usize,
    pub categories: BTreeMap<String, usize>,
    // travelers with at least one committed change
    pub perturbed_travelers: usize,
    // travelers whose departure from the first activity moved
    pub departures_shifted: usize,
    pub intensity: f64,
}

impl PerturbationSummary {
    pub fn total_perturbations(&self) -> usize {
        self.temporal_perturbations + self.spatial_perturbations + self.demand_perturbations
    }

    pub fn category_count(&self, category: &str) -> usize {
        self.categories.get(category).cloned().unwrap_or(0)
    }
}

pub struct PerturbationResult {
    pub population: Population,
    pub summary: PerturbationSummary,
}

#[derive(Default)]
struct Tally {
    temporal: usize,
    spatial: usize,
    demand: usize,
    categories: BTreeMap<String, usize>,
}

impl Tally {
    fn bump(&mut self, category: &str) {
        *self.categories.entry(String::from(category)).or_insert(0) += 1;
    }

    fn total(&self) -> usize {
        self.temporal + self.spatial + self.demand
    }
}

/// Rule 3 draws one of these per traveler.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum CombinedOutcome {
    TemporalOnly,
    SpatialOnly,
    TemporalAndSpatial,
    Demand,
    Untouched,
}

impl CombinedOutcome {
    fn from_draw(uu: f64) -> CombinedOutcome {
        if uu < 0.15 {
            CombinedOutcome::TemporalOnly
        } else if uu < 0.25 {
            CombinedOutcome::SpatialOnly
        } else if uu < 0.30 {
            CombinedOutcome::TemporalAndSpatial
        } else if uu < 0.35 {
            CombinedOutcome::Demand
        } else {
            CombinedOutcome::Untouched
        }
    }
}

/// Injects seeded noise into times and locations to emulate forecast error.
#[derive(PartialEq, Debug, Clone)]
pub struct UncertaintyPerturbator {
    pub time_std_s: f64,
    pub distance_std_m: f64,
    pub temporal_probability: f64,
    pub spatial_probability: f64,
    pub min_time_shift_s: f64,
    pub min_displacement_m: f64,
    // rule 3 scales both deviations by this
    pub combined_scale: f64,
    pub demand_std_s: f64,
    pub max_demand_cut_s: f64,
}

impl Default for UncertaintyPerturbator {
    fn default() -> UncertaintyPerturbator {
        UncertaintyPerturbator {
            time_std_s: 20. * 60.,
            distance_std_m: 200.,
            temporal_probability: 0.3,
            spatial_probability: 0.25,
            min_time_shift_s: 60.,
            min_displacement_m: 50.,
            combined_scale: 0.7,
            demand_std_s: 2. * 3600.,
            max_demand_cut_s: 4. * 3600.,
        }
    }
}

impl UncertaintyPerturbator {
    pub fn perturb<R: Rng + ?Sized>(&self, population: &[TripChainRecord],
                                    pattern: &DemandPattern, rng: &mut R) -> PerturbationResult {
        let family = pattern.id.rule.family();
        let mut perturbed: Population = population.iter().enumerate()
            .map(|(ii, pp)| pp.clone_with_id(&pattern.id.person_id(ii)))
            .collect();

        let mut tally = Tally::default();
        let mut perturbed_travelers = 0;
        for person in perturbed.iter_mut() {
            if !person.is_well_formed() {
                continue;
            }
            let before = tally.total();
            match family {
                PerturbationFamily::Temporal => self.temporal_rule(person, rng, &mut tally),
                PerturbationFamily::Spatial => self.spatial_rule(person, rng, &mut tally),
                PerturbationFamily::Combined => self.combined_rule(person, rng, &mut tally),
                PerturbationFamily::Unperturbed => (),
            }
            if tally.total() > before {
                perturbed_travelers += 1;
            }
        }

        let departures_shifted = population.iter().zip(perturbed.iter())
            .filter(|(before, after)| before.departure_time_s() != after.departure_time_s())
            .count();
        let intensity = if perturbed.is_empty() {
            0.
        } else {
            tally.total() as f64 / (perturbed.len() * NOMINAL_ACTIVITIES) as f64
        };
        log::info!("{}: {} perturbations over {} travelers, intensity {:.3}", pattern.id,
                   tally.total(), perturbed_travelers, intensity);

        PerturbationResult {
            population: perturbed,
            summary: PerturbationSummary {
                method: family.method_tag(),
                family,
                temporal_perturbations: tally.temporal,
                spatial_perturbations: tally.spatial,
                demand_perturbations: tally.demand,
                categories: tally.categories,
                perturbed_travelers,
                departures_shifted,
                intensity,
            },
        }
    }

    fn temporal_rule<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, rng: &mut R,
                                      tally: &mut Tally) {
        for ei in person.activity_indices() {
            let has_end = person.activity_at(ei).map_or(false, |act| act.end_time_s.is_some());
            if has_end && bernoulli(rng, self.temporal_probability) {
                self.shift_time(person, ei, self.time_std_s, rng, tally);
            }
        }
    }

    fn spatial_rule<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, rng: &mut R,
                                     tally: &mut Tally) {
        for ei in person.activity_indices() {
            if bernoulli(rng, self.spatial_probability) {
                self.displace(person, ei, self.distance_std_m, rng, tally);
            }
        }
    }

    fn combined_rule<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, rng: &mut R,
                                      tally: &mut Tally) {
        let time_std = self.time_std_s * self.combined_scale;
        let distance_std = self.distance_std_m * self.combined_scale;
        let outcome = CombinedOutcome::from_draw(rng.gen::<f64>());

        match outcome {
            CombinedOutcome::TemporalOnly => self.shift_all(person, time_std, rng, tally),
            CombinedOutcome::SpatialOnly => self.displace_all(person, distance_std, rng, tally),
            CombinedOutcome::TemporalAndSpatial => {
                self.shift_all(person, time_std, rng, tally);
                self.displace_all(person, distance_std, rng, tally);
                tally.bump(COMBINED_CATEGORY);
            }
            CombinedOutcome::Demand => self.change_duration(person, rng, tally),
            CombinedOutcome::Untouched => (),
        }
    }

    fn shift_all<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, std_dev: f64, rng: &mut R,
                                  tally: &mut Tally) {
        for ei in person.activity_indices() {
            self.shift_time(person, ei, std_dev, rng, tally);
        }
    }

    fn displace_all<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, std_dev: f64,
                                     rng: &mut R, tally: &mut Tally) {
        for ei in person.activity_indices() {
            self.displace(person, ei, std_dev, rng, tally);
        }
    }

    /// Shift one activity's end time by Gaussian noise. Shifts of a minute or less, and shifts
    /// that would end a destination activity before the traveler arrives, are dropped.
    fn shift_time<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, element_idx: usize,
                                   std_dev: f64, rng: &mut R, tally: &mut Tally) -> bool {
        let current = match person.activity_at(element_idx).and_then(|act| act.end_time_s) {
            Some(tt) => tt,
            None => return false,
        };
        let drawn = gaussian(rng, std_dev);
        let shifted = (current + drawn).max(0.);
        if (shifted - current).abs() <= self.min_time_shift_s {
            return false;
        }

        self.set_end_time(person, element_idx, shifted);
        if !person.is_chain_consistent() {
            self.set_end_time(person, element_idx, current);
            return false;
        }
        tally.temporal += 1;
        tally.bump(time_shift_category(drawn));
        true
    }

    fn displace<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, element_idx: usize,
                                 std_dev: f64, rng: &mut R, tally: &mut Tally) -> bool {
        let act = match person.activity_at_mut(element_idx) {
            Some(act) => act,
            None => return false,
        };
        let angle = random_angle(rng);
        let distance = half_normal(rng, std_dev);
        if distance <= self.min_displacement_m {
            return false;
        }
        act.coord = act.coord.offset_polar(angle, distance);
        tally.spatial += 1;
        tally.bump(distance_category(distance));
        true
    }

    /// Stretch or shorten the stay at the destination by N(0, demand_std_s), never cutting more
    /// than `max_demand_cut_s` and never ending before arrival.
    fn change_duration<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, rng: &mut R,
                                        tally: &mut Tally) {
        let dest_idx = person.activity_indices().into_iter().find(|ei| {
            person.activity_at(*ei)
                .map_or(false, |act| act.act_type == ActivityType::Destination &&
                                     act.end_time_s.is_some())
        });
        let dest_idx = match dest_idx {
            Some(ei) => ei,
            None => return,
        };
        let current = match person.activity_at(dest_idx).and_then(|act| act.end_time_s) {
            Some(tt) => tt,
            None => return,
        };
        let arrival = person.arrival_time_s(dest_idx).unwrap_or(0.);

        let perturbed = (current + gaussian(rng, self.demand_std_s))
            .max(current - self.max_demand_cut_s)
            .max(arrival);
        self.set_end_time(person, dest_idx, perturbed);
        tally.demand += 1;
        tally.bump(DEMAND_CATEGORY);
    }

    fn set_end_time(&self, person: &mut TripChainRecord, element_idx: usize, end_time_s: f64) {
        if let Some(act) = person.activity_at_mut(element_idx) {
            act.end_time_s = Some(end_time_s);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PatternId;
    use crate::sampling::seeded_rng;
    use crate::test_utils::grid_population;

    fn run(base: &[TripChainRecord], rule: u32, seed: u64) -> PerturbationResult {
        let pattern = DemandPattern::new(PatternId::new("S1", 1.0, rule));
        UncertaintyPerturbator::default().perturb(base, &pattern, &mut seeded_rng(seed))
    }

    #[test]
    fn test_categories() {
        assert_eq!(time_shift_category(-4. * 60.), "shift_lt_5min");
        assert_eq!(time_shift_category(5. * 60.), "shift_5_15min");
        assert_eq!(time_shift_category(-29. * 60.), "shift_15_30min");
        assert_eq!(time_shift_category(45. * 60.), "shift_gt_30min");
        assert_eq!(distance_category(99.), "dist_lt_100m");
        assert_eq!(distance_category(300.), "dist_300_500m");
        assert_eq!(distance_category(800.), "dist_gt_500m");
    }

    #[test]
    fn test_rule1_only_commits_shifts_over_a_minute() {
        let base = grid_population(2000, 31);
        let result = run(&base, 1, 8);
        let summary = &result.summary;
        assert_eq!(summary.method, "TEMPORAL_UNCERTAINTY_PERTURBATIONS");
        assert_eq!(summary.spatial_perturbations, 0);
        assert!(summary.temporal_perturbations > 0);

        let mut changed = 0;
        for (before, after) in base.iter().zip(result.population.iter()) {
            assert!(after.is_canonical());
            assert!(after.is_chain_consistent());
            for (ba, aa) in before.activities().zip(after.activities()) {
                assert_eq!(ba.coord, aa.coord);
                if ba.end_time_s != aa.end_time_s {
                    let shift = (aa.end_time_s.unwrap() - ba.end_time_s.unwrap()).abs();
                    assert!(shift > 60.);
                    changed += 1;
                }
            }
        }
        assert_eq!(changed, summary.temporal_perturbations);
        let buckets = ["shift_lt_5min", "shift_5_15min", "shift_15_30min", "shift_gt_30min"];
        let bucketed: usize = buckets.iter()
            .map(|cc| summary.category_count(cc))
            .sum();
        assert_eq!(bucketed, summary.temporal_perturbations);
        // ~30% of the 4000 timed activities, nearly all above the threshold
        assert!(summary.temporal_perturbations > 1000 && summary.temporal_perturbations < 1400);
    }

    #[test]
    fn test_rule2_displacements() {
        let base = grid_population(1000, 32);
        let result = run(&base, 2, 9);
        let summary = &result.summary;
        assert_eq!(summary.temporal_perturbations, 0);
        assert_eq!(summary.departures_shifted, 0);

        let mut moved = 0;
        for (before, after) in base.iter().zip(result.population.iter()) {
            for (ba, aa) in before.activities().zip(after.activities()) {
                assert_eq!(ba.end_time_s, aa.end_time_s);
                let dist = ba.coord.euclidean_distance(&aa.coord);
                if dist > 0. {
                    assert!(dist > 50. - 1e-6);
                    moved += 1;
                }
            }
        }
        assert_eq!(moved, summary.spatial_perturbations);
        assert!(summary.spatial_perturbations > 0);
    }

    #[test]
    fn test_rule3_outcomes() {
        let base = grid_population(2000, 33);
        let result = run(&base, 3, 10);
        let summary = &result.summary;
        assert_eq!(summary.method, "COMBINED_UNCERTAINTY_PERTURBATIONS");
        assert!(summary.demand_perturbations > 50 && summary.demand_perturbations < 150);
        assert!(summary.category_count(COMBINED_CATEGORY) > 50);
        assert_eq!(summary.category_count(DEMAND_CATEGORY), summary.demand_perturbations);
        // roughly 35% of travelers are drawn for some change
        assert!(summary.perturbed_travelers > 550 && summary.perturbed_travelers < 850);
        for person in &result.population {
            assert!(person.is_chain_consistent());
        }
    }

    #[test]
    fn test_demand_change_is_bounded() {
        let base = grid_population(3000, 34);
        let result = run(&base, 3, 11);
        for (before, after) in base.iter().zip(result.population.iter()) {
            let old_end = before.activity_at(2).unwrap().end_time_s.unwrap();
            let new_end = after.activity_at(2).unwrap().end_time_s.unwrap();
            // temporal noise may also move it, but never by four hours
            assert!(new_end >= old_end - 4. * 3600. - 1e-6);
            assert!(after.is_chain_consistent());
        }
    }

    #[test]
    fn test_unknown_rule_only_renumbers() {
        let base = grid_population(50, 35);
        let id_pattern = DemandPattern::new(PatternId::new("base", 0.5, 7));
        let result = UncertaintyPerturbator::default()
            .perturb(&base, &id_pattern, &mut seeded_rng(1));
        assert_eq!(result.summary.method, "NO_UNCERTAINTY_PERTURBATIONS");
        assert_eq!(result.summary.total_perturbations(), 0);
        assert_eq!(result.summary.intensity, 0.);
        assert_eq!(result.population[3].get_id(), "base_trip0.5_rule7_person_3");
        for (before, after) in base.iter().zip(result.population.iter()) {
            assert_eq!(before.elements(), after.elements());
        }
    }

    #[test]
    fn test_intensity() {
        let base = grid_population(500, 36);
        let result = run(&base, 2, 12);
        let expected = result.summary.total_perturbations() as f64 / 1500.;
        assert!((result.summary.intensity - expected).abs() < 1e-12);
    }
}
