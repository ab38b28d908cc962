use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::NaiveDate;
use chrono::NaiveTime;
use rand::Rng;

use crate::demand::DemandPattern;
use crate::demand::RealTimeTrip;
use crate::demand::ZoneId;
use crate::geometry::Point2d;
use crate::rules::PatternId;
use crate::sampling::seeded_rng;
use crate::trip_chain::Population;
use crate::trip_chain::TripChainRecord;
use crate::trip_chain::DEFAULT_LEG_MODE;


/// Checks that two maps have the same keys and values within `epsilon` of each other.
pub fn compare_maps<KK>(query_map: &BTreeMap<KK, f64>, true_map: &BTreeMap<KK, f64>,
                        epsilon: f64)
    where KK: Debug + Ord,
{
    assert_eq!(query_map.len(), true_map.len());

    for (true_key, true_val) in true_map {
        match query_map.get(true_key) {
            Some(val) => assert!((val - true_val).abs() <= epsilon,
                                 "{:?}: {} != {}", true_key, val, true_val),
            None => assert!(false, "Key {:?} missing!", true_key),
        }
    }
}

/// `size` canonical travelers whose origins are spread over a few square kilometres and who all
/// leave between 10:00 and 14:00.
pub fn grid_population(size: usize, seed: u64) -> Population {
    let mut rng = seeded_rng(seed);
    let base = Point2d::new(940_000., 1_910_000.);
    (0..size).map(|ii| {
        let origin = base.plus(&Point2d::new(rng.gen_range(0.0..4000.), rng.gen_range(0.0..3000.)));
        let destination = origin.plus(&Point2d::new(rng.gen_range(-800.0..800.),
                                                    rng.gen_range(-800.0..800.)));
        let departure = rng.gen_range(10. * 3600.0..14. * 3600.);
        TripChainRecord::round_trip(&format!("base_{}", ii), origin, destination, departure,
                                    DEFAULT_LEG_MODE)
    }).collect()
}

/// A pattern with `per_hour` trips in every listed hour, spread over a ring of zones.
pub fn uniform_pattern(scenario: &str, multiplier: f64, rule: u32, hours: &[u32],
                       per_hour: f64, num_zones: u32) -> DemandPattern {
    let mut pattern = DemandPattern::new(PatternId::new(scenario, multiplier, rule));
    let per_pair = per_hour / num_zones as f64;
    for hour in hours {
        for zone in 1..=num_zones {
            let dest = zone % num_zones + 1;
            pattern.add_demand(zone, dest, *hour, per_pair);
        }
    }
    pattern
}

/// An observed trip already in the projected frame, departing `departure_s` after midnight.
pub fn real_time_trip(origin_zone: ZoneId, destination_zone: ZoneId, origin: Point2d,
                      destination: Point2d, departure_s: f64) -> RealTimeTrip {
    let time = NaiveTime::from_num_seconds_from_midnight_opt(departure_s as u32, 0).unwrap();
    let departure = NaiveDate::from_ymd_opt(2024, 10, 24).unwrap().and_time(time);
    RealTimeTrip {
        idx: 0,
        origin_zone,
        destination_zone,
        hour: (departure_s / 3600.) as u32,
        origin_h3: String::new(),
        dest_h3: String::new(),
        origin_raw: origin,
        dest_raw: destination,
        origin_geodetic: origin,
        dest_geodetic: destination,
        origin,
        destination,
        departure,
        departure_time_s: departure_s,
    }
}
