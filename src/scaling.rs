use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::geometry::Point2d;
use super::sampling::gaussian;
use super::trip_chain::ActivityType;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;
use super::trip_chain::NOMINAL_ACTIVITIES;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ScalingMethod {
    NoScaling,
    StratifiedSampling,
    DuplicationWithVariation,
}

impl ScalingMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            ScalingMethod::NoScaling => "NO_SCALING",
            ScalingMethod::StratifiedSampling => "STRATIFIED_SAMPLING",
            ScalingMethod::DuplicationWithVariation => "DUPLICATION_WITH_VARIATION",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ScalingSummary {
    pub method: ScalingMethod,
    pub original_size: usize,
    pub scaled_size: usize,
    pub actual_multiplier: f64,
    // zero unless the population was down-sampled
    pub strata_count: usize,
}

pub struct ScalingResult {
    pub population: Population,
    pub summary: ScalingSummary,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ScalingValidation {
    pub passed: bool,
    pub deviations: BTreeMap<ActivityType, f64>,
}

/// Resizes a population to a demand multiplier while keeping its spatial make-up.
#[derive(PartialEq, Debug, Clone)]
pub struct PopulationScaler {
    pub stratum_cell_m: f64,
    pub coord_std_m: f64,
    pub time_std_s: f64,
}

impl Default for PopulationScaler {
    fn default() -> PopulationScaler {
        PopulationScaler {
            stratum_cell_m: 1000.,
            coord_std_m: 50.,
            time_std_s: 15. * 60.,
        }
    }
}

type Stratum<'a> = Vec<&'a TripChainRecord>;

impl PopulationScaler {
    pub fn scale<R: Rng + ?Sized>(&self, base: &[TripChainRecord], multiplier: f64,
                                  scenario_tag: &str, rule_tag: u32, rng: &mut R)
                                  -> ScalingResult {
        let mut next_id = 0;
        let mut fresh_id = || {
            let id = format!("{}_r{}_person_{}", scenario_tag, rule_tag, next_id);
            next_id += 1;
            id
        };

        let mut strata_count = 0;
        let (method, population) = if (multiplier - 1.).abs() < 0.001 {
            let population = base.iter().map(|pp| pp.clone_with_id(&fresh_id())).collect();
            (ScalingMethod::NoScaling, population)

        } else if multiplier < 1. {
            let mut strata = self.spatial_strata(base);
            strata_count = strata.len();
            let mut population = vec![];
            for stratum in strata.values_mut() {
                let keep = ((stratum.len() as f64 * multiplier).round() as usize).max(1);
                stratum.shuffle(rng);
                for person in stratum.iter().take(keep) {
                    population.push(person.clone_with_id(&fresh_id()));
                }
            }
            (ScalingMethod::StratifiedSampling, population)

        } else {
            let target = (base.len() as f64 * multiplier).round() as usize;
            let mut population: Population = base.iter()
                .map(|pp| pp.clone_with_id(&fresh_id()))
                .collect();
            while population.len() < target {
                let source = &base[rng.gen_range(0..base.len())];
                let mut duplicate = source.clone_with_id(&fresh_id());
                self.vary(&mut duplicate, rng);
                population.push(duplicate);
            }
            (ScalingMethod::DuplicationWithVariation, population)
        };

        let actual_multiplier = if base.is_empty() {
            0.
        } else {
            population.len() as f64 / base.len() as f64
        };
        log::debug!("scaled {} travelers to {} with {}", base.len(), population.len(),
                    method.tag());
        let summary = ScalingSummary {
            method,
            original_size: base.len(),
            scaled_size: population.len(),
            actual_multiplier,
            strata_count,
        };
        ScalingResult {
            population,
            summary,
        }
    }

    /// Group travelers by the grid cell of their origin; travelers without an origin activity
    /// share the `None` stratum.
    fn spatial_strata<'a>(&self, base: &'a [TripChainRecord])
                          -> BTreeMap<Option<(i64, i64)>, Stratum<'a>> {
        let mut strata: BTreeMap<Option<(i64, i64)>, Stratum<'a>> = BTreeMap::new();
        for person in base {
            let cell = person.origin_activity()
                .map(|act| act.coord.grid_cell(self.stratum_cell_m));
            strata.entry(cell).or_insert(vec![]).push(person);
        }
        strata
    }

    fn vary<R: Rng + ?Sized>(&self, person: &mut TripChainRecord, rng: &mut R) {
        for act in person.activities_mut() {
            let dx = gaussian(rng, self.coord_std_m);
            let dy = gaussian(rng, self.coord_std_m);
            act.coord = act.coord.plus(&Point2d::new(dx, dy));
            if let Some(end) = act.end_time_s {
                act.end_time_s = Some((end + gaussian(rng, self.time_std_s)).max(0.));
            }
        }
    }
}

fn activity_type_counts(population: &[TripChainRecord]) -> BTreeMap<ActivityType, usize> {
    let mut counts = BTreeMap::new();
    for act in population.iter().flat_map(|pp| pp.activities()) {
        *counts.entry(act.act_type).or_insert(0) += 1;
    }
    counts
}

/// Compare each activity type's share of the nominal activity count between two populations.
pub fn validate_scaled_population(source: &[TripChainRecord], scaled: &[TripChainRecord],
                                  tolerance: f64) -> ScalingValidation {
    let ratio = |count: usize, persons: usize| {
        if persons == 0 {
            0.
        } else {
            count as f64 / (persons * NOMINAL_ACTIVITIES) as f64
        }
    };
    let source_counts = activity_type_counts(source);
    let scaled_counts = activity_type_counts(scaled);

    let mut deviations = BTreeMap::new();
    let mut passed = true;
    for (act_type, count) in &source_counts {
        let scaled_count = scaled_counts.get(act_type).cloned().unwrap_or(0);
        let deviation = (ratio(*count, source.len()) - ratio(scaled_count, scaled.len())).abs();
        if deviation > tolerance {
            log::warn!("{} activity share deviates by {:.4}", act_type.as_str(), deviation);
            passed = false;
        }
        deviations.insert(*act_type, deviation);
    }

    ScalingValidation {
        passed,
        deviations,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::seeded_rng;
    use crate::test_utils::grid_population;

    #[test]
    fn test_no_scaling_preserves_activities() {
        let base = grid_population(200, 7);
        let result = PopulationScaler::default()
            .scale(&base, 1.0, "base", 1, &mut seeded_rng(1));
        assert_eq!(result.summary.method, ScalingMethod::NoScaling);
        assert_eq!(result.population.len(), base.len());

        let key = |pop: &[TripChainRecord]| {
            let mut pairs: Vec<(ActivityType, (i64, i64))> = pop.iter()
                .flat_map(|pp| pp.activities().map(|aa| (aa.act_type, aa.coord.rounded())))
                .collect();
            pairs.sort();
            pairs
        };
        assert_eq!(key(&base), key(&result.population));
        assert_eq!(result.population[0].get_id(), "base_r1_person_0");
        assert_eq!(result.population[199].get_id(), "base_r1_person_199");
    }

    #[test]
    fn test_size_contract() {
        let base = grid_population(1000, 3);
        let scaler = PopulationScaler::default();

        let down = scaler.scale(&base, 0.5, "S1", 2, &mut seeded_rng(10));
        assert_eq!(down.summary.method, ScalingMethod::StratifiedSampling);
        assert!(down.summary.strata_count > 0);
        let diff = (down.population.len() as i64 - 500).abs() as usize;
        assert!(diff <= down.summary.strata_count);

        let up = scaler.scale(&base, 1.5, "S1", 2, &mut seeded_rng(10));
        assert_eq!(up.summary.method, ScalingMethod::DuplicationWithVariation);
        assert_eq!(up.population.len(), 1500);
        assert_eq!(up.summary.scaled_size, 1500);
        assert!((up.summary.actual_multiplier - 1.5).abs() < 1e-9);

        let same = scaler.scale(&base, 1.0, "S1", 2, &mut seeded_rng(10));
        assert_eq!(same.population.len(), 1000);
    }

    #[test]
    fn test_scaled_chains_stay_valid() {
        let base = grid_population(300, 5);
        let scaler = PopulationScaler::default();
        for mult in &[0.5, 1.5] {
            let result = scaler.scale(&base, *mult, "S3", 3, &mut seeded_rng(2));
            for person in &result.population {
                assert!(person.is_canonical());
                assert!(person.is_chain_consistent());
            }
            let validation = validate_scaled_population(&base, &result.population, 0.05);
            assert!(validation.passed);
        }
    }

    #[test]
    fn test_ids_are_unique_and_input_untouched() {
        let base = grid_population(100, 9);
        let snapshot = base.clone();
        let result = PopulationScaler::default()
            .scale(&base, 1.5, "S2", 1, &mut seeded_rng(4));
        let mut ids: Vec<&str> = result.population.iter().map(|pp| pp.get_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 150);
        assert_eq!(base, snapshot);
    }

    #[test]
    fn test_scaling_is_deterministic() {
        let base = grid_population(400, 1);
        let scaler = PopulationScaler::default();
        let first = scaler.scale(&base, 0.5, "base", 1, &mut seeded_rng(99));
        let second = scaler.scale(&base, 0.5, "base", 1, &mut seeded_rng(99));
        assert_eq!(first.population, second.population);
    }

    #[test]
    fn test_validation_flags_skewed_population() {
        let base = grid_population(10, 1);
        let mut skewed = base.clone();
        // a traveler with only an origin activity shifts the activity shares
        for _ in 0..10 {
            skewed.push(TripChainRecord::new("lone", vec![
                crate::trip_chain::PlanElement::Activity(crate::trip_chain::Activity::new(
                    ActivityType::Origin, Point2d::new(0., 0.), None))
            ]));
        }
        let validation = validate_scaled_population(&base, &skewed, 0.05);
        assert!(!validation.passed);
        assert!(validation.deviations[&ActivityType::Destination] > 0.05);
    }
}
