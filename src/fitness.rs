use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::trip_chain::ActivityType;
use super::trip_chain::TripChainRecord;

/// Similarity between a target and an actual distribution: 1 - RMSE / mean(target), floored at 0.
/// Keys missing from either side count as zero.
pub fn normalized_rmse_fitness<K: Ord + Copy>(target: &BTreeMap<K, f64>,
                                              actual: &BTreeMap<K, f64>) -> f64 {
    let keys: BTreeSet<K> = target.keys().chain(actual.keys()).cloned().collect();
    if keys.is_empty() {
        return 1.;
    }

    let mut sq_err = 0.;
    for key in &keys {
        let tt = target.get(key).cloned().unwrap_or(0.);
        let aa = actual.get(key).cloned().unwrap_or(0.);
        sq_err += (tt - aa).powi(2);
    }
    let rmse = (sq_err / keys.len() as f64).sqrt();

    let mean_target = target.values().sum::<f64>() / keys.len() as f64;
    let nrmse = if mean_target > 0. { rmse / mean_target } else { 0. };
    (1. - nrmse).max(0.)
}

/// Number of origin-activity departures in each hour, keyed by floor(end time / 3600).
pub fn hourly_departure_histogram(population: &[TripChainRecord]) -> BTreeMap<u32, f64> {
    let mut histogram = BTreeMap::new();
    let departures = population.iter()
        .flat_map(|pp| pp.activities())
        .filter(|act| act.act_type == ActivityType::Origin)
        .filter_map(|act| act.end_time_s);
    for departure in departures {
        let hour = (departure.max(0.) / 3600.).floor() as u32;
        *histogram.entry(hour).or_insert(0.) += 1.;
    }
    histogram
}
