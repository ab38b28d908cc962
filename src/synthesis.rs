use std::error::Error;

use rand::Rng;

use super::demand::DemandPattern;
use super::demand::RealTimeTrip;
use super::demand::RulesDataSet;
use super::geometry::Point2d;
use super::sampling::gaussian;
use super::sampling::seeded_rng;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;
use super::trip_chain::DEFAULT_LEG_MODE;
use super::zones::SyntheticGrid;
use super::zones::ZoneRegistry;
use super::zones::ZoneRole;

/// Standard deviation of the noise added to zone coordinates when building travelers from OD
/// volumes.
pub const ZONE_JITTER_STD_M: f64 = 100.;


/// One round-trip traveler per observed trip, keeping its coordinates and departure time.
pub fn population_from_real_time(trips: &[RealTimeTrip]) -> Population {
    let mut population = vec![];
    for trip in trips {
        if !trip.origin.is_finite() || !trip.destination.is_finite() {
            log::warn!("real-time trip {} has unusable coordinates, skipping it", trip.idx);
            continue;
        }
        population.push(TripChainRecord::round_trip(&format!("rt_{}", trip.idx), trip.origin,
                                                    trip.destination, trip.departure_time_s,
                                                    DEFAULT_LEG_MODE));
    }
    population
}

/// One round-trip traveler per whole trip of each OD volume, placed near the zones'
/// representative coordinates and leaving at a uniform time within the volume's hour.
/// Intra-zonal volumes are skipped.
pub fn population_from_pattern<R: Rng + ?Sized>(pattern: &DemandPattern, zones: &ZoneRegistry,
                                                rng: &mut R) -> Population {
    let mut population = vec![];
    for ((orig, dest, hour), volume) in pattern.od_volumes() {
        if orig == dest {
            continue;
        }
        let origin_anchor = zones.representative(*orig, ZoneRole::Origin);
        let dest_anchor = zones.representative(*dest, ZoneRole::Destination);
        for _ in 0..(volume.round() as usize) {
            let origin = jitter(rng, &origin_anchor);
            let destination = jitter(rng, &dest_anchor);
            let departure = *hour as f64 * 3600. + rng.gen_range(0.0..3600.);
            let id = format!("synth_{}", population.len());
            population.push(TripChainRecord::round_trip(&id, origin, destination, departure,
                                                        DEFAULT_LEG_MODE));
        }
    }
    population
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, anchor: &Point2d) -> Point2d {
    let dx = gaussian(rng, ZONE_JITTER_STD_M);
    let dy = gaussian(rng, ZONE_JITTER_STD_M);
    anchor.plus(&Point2d::new(dx, dy))
}

/// A base population for runs that don't supply one: the baseline scenario's real-time trips if
/// any were loaded, else another scenario's, else travelers built from the baseline pattern (or
/// the first pattern by id).
pub fn default_base_population(dataset: &RulesDataSet, grid: &SyntheticGrid, seed: u64)
                               -> Result<Population, Box<dyn Error>> {
    let scenario = if dataset.real_time_trips("base").is_empty() {
        dataset.scenarios_with_trips()
            .find(|ss| !dataset.real_time_trips(ss).is_empty())
            .cloned()
    } else {
        Some(String::from("base"))
    };
    if let Some(scenario) = scenario {
        let population = population_from_real_time(dataset.real_time_trips(&scenario));
        if !population.is_empty() {
            log::info!("built {} base travelers from the {} real-time trips", population.len(),
                       scenario);
            return Ok(population);
        }
    }

    let pattern = dataset.get_pattern("base", 1.0, 1)
        .or_else(|| dataset.patterns().next())
        .ok_or("no real-time trips or demand patterns to build a base population from")?;
    let trips = dataset.real_time_trips(&pattern.id.scenario);
    let zones = ZoneRegistry::for_pattern(pattern, trips, grid);
    let population = population_from_pattern(pattern, &zones, &mut seeded_rng(seed));
    if population.is_empty() {
        return Err(format!("pattern {} yields no base travelers", pattern.id).into());
    }
    log::info!("built {} base travelers from pattern {}", population.len(), pattern.id);
    Ok(population)
}
