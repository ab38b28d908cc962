use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::demand::DemandPattern;
use super::demand::RealTimeTrip;
use super::fitness::hourly_departure_histogram;
use super::fitness::normalized_rmse_fitness;
use super::sampling::bernoulli;
use super::sampling::gaussian;
use super::scenario::ClusterTiming;
use super::scenario::PeakShaping;
use super::trip_chain::ActivityType;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;

#[derive(PartialEq, Debug, Clone)]
pub struct TemporalSummary {
    pub method: &'static str,
    pub target_hourly: BTreeMap<u32, f64>,
    pub actual_hourly: BTreeMap<u32, f64>,
    pub temporal_fitness: f64,
    pub slot_assignments: usize,
    pub real_trip_assignments: usize,
}

pub struct TemporalAdjustmentResult {
    pub population: Population,
    pub summary: TemporalSummary,
}

/// Moves departure times so the hourly departure profile follows a demand pattern.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct TemporalPatternAdjuster;

impl TemporalPatternAdjuster {
    pub fn new() -> TemporalPatternAdjuster {
        TemporalPatternAdjuster
    }

    pub fn adjust<R: Rng + ?Sized>(&self, population: &[TripChainRecord], pattern: &DemandPattern,
                                   real_time_trips: &[RealTimeTrip], rng: &mut R)
                                   -> TemporalAdjustmentResult {
        let mut adjusted: Population = population.iter()
            .map(|pp| pp.clone_with_id(pp.get_id()))
            .collect();

        let target_hourly = target_distribution(pattern);
        let slot_assignments = redistribute(&mut adjusted, &target_hourly, rng);

        let mut real_trip_assignments = 0;
        let scenario = &pattern.scenario;
        if let Some(peaks) = scenario.peak_shaping() {
            enhance_peaks(&mut adjusted, peaks, rng);
        }
        if let Some(timing) = scenario.cluster_timing() {
            add_cluster_timing(&mut adjusted, timing, rng);
        }
        if scenario.uses_real_patterns() && !real_time_trips.is_empty() {
            real_trip_assignments = apply_real_departures(&mut adjusted, real_time_trips, rng);
        }

        for person in adjusted.iter_mut().filter(|pp| pp.is_well_formed()) {
            person.enforce_destination_durations();
        }

        let actual_hourly = hourly_departure_histogram(&adjusted);
        let temporal_fitness = normalized_rmse_fitness(&target_hourly, &actual_hourly);
        log::info!("{}: temporal fitness {:.3} after {} slot assignments", pattern.id,
                   temporal_fitness, slot_assignments);

        TemporalAdjustmentResult {
            population: adjusted,
            summary: TemporalSummary {
                method: scenario.temporal_method(),
                target_hourly,
                actual_hourly,
                temporal_fitness,
                slot_assignments,
                real_trip_assignments,
            },
        }
    }
}

/// Hourly totals rounded to whole departures; hours that round to zero are dropped.
pub fn target_distribution(pattern: &DemandPattern) -> BTreeMap<u32, f64> {
    pattern.hourly_totals().iter()
        .map(|(hour, total)| (*hour, total.round()))
        .filter(|(_, count)| *count > 0.)
        .collect()
}

/// (traveler index, element index) of every origin activity with an end time on a well-formed
/// chain.
fn origin_departures(population: &[TripChainRecord]) -> Vec<(usize, usize)> {
    let mut departures = vec![];
    for (pi, person) in population.iter().enumerate() {
        if !person.is_well_formed() {
            continue;
        }
        for ei in person.activity_indices() {
            if let Some(act) = person.activity_at(ei) {
                if act.act_type == ActivityType::Origin && act.end_time_s.is_some() {
                    departures.push((pi, ei));
                }
            }
        }
    }
    departures
}

fn redistribute<R: Rng + ?Sized>(population: &mut [TripChainRecord],
                                 target: &BTreeMap<u32, f64>, rng: &mut R) -> usize {
    let mut slots = vec![];
    for (hour, count) in target {
        let start = *hour as f64 * 3600.;
        for _ in 0..(*count as usize) {
            slots.push(start + rng.gen::<f64>() * 3600.);
        }
    }
    let mut departures = origin_departures(population);
    slots.shuffle(rng);
    departures.shuffle(rng);

    let num_assigned = slots.len().min(departures.len());
    for ((pi, ei), slot) in departures.iter().zip(slots.iter()) {
        if let Some(act) = population[*pi].activity_at_mut(*ei) {
            act.end_time_s = Some(*slot);
        }
    }
    num_assigned
}

fn enhance_peaks<R: Rng + ?Sized>(population: &mut [TripChainRecord], peaks: &PeakShaping,
                                  rng: &mut R) {
    if peaks.peak_hours.is_empty() {
        return;
    }
    for (pi, ei) in origin_departures(population) {
        if let Some(act) = population[pi].activity_at_mut(ei) {
            let current = match act.end_time_s {
                Some(tt) => tt,
                None => continue,
            };
            let current_hour = (current / 3600.).floor() as i64;
            // first listed peak wins ties
            let nearest = peaks.peak_hours.iter()
                .min_by_key(|hh| (**hh as i64 - current_hour).abs())
                .cloned()
                .unwrap_or(current_hour as u32);
            if bernoulli(rng, peaks.snap_probability) {
                let shaped = nearest as f64 * 3600. + gaussian(rng, peaks.noise_std_s);
                act.end_time_s = Some(shaped.max(0.));
            }
        }
    }
}

fn add_cluster_timing<R: Rng + ?Sized>(population: &mut [TripChainRecord],
                                       timing: &ClusterTiming, rng: &mut R) {
    for person in population.iter_mut().filter(|pp| pp.is_well_formed()) {
        for act in person.activities_mut() {
            if let Some(end) = act.end_time_s {
                if bernoulli(rng, timing.jitter_probability) {
                    act.end_time_s = Some((end + gaussian(rng, timing.noise_std_s)).max(0.));
                }
            }
        }
    }
}

/// Give randomly chosen travelers the observed departure times, one trip each.
fn apply_real_departures<R: Rng + ?Sized>(population: &mut [TripChainRecord],
                                          trips: &[RealTimeTrip], rng: &mut R) -> usize {
    let mut travelers: Vec<usize> = (0..population.len())
        .filter(|pi| population[*pi].is_well_formed())
        .collect();
    travelers.shuffle(rng);

    let mut assigned = 0;
    for (pi, trip) in travelers.iter().zip(trips.iter()) {
        let first_departure = population[*pi].activities_mut()
            .find(|act| act.act_type == ActivityType::Origin && act.end_time_s.is_some());
        if let Some(act) = first_departure {
            act.end_time_s = Some(trip.departure_time_s);
            assigned += 1;
        }
    }
    assigned
}
