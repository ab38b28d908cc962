use std::collections::BTreeMap;
use std::collections::BTreeSet;

use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use rand::seq::SliceRandom;
use rand::Rng;

use super::demand::DemandPattern;
use super::demand::RealTimeTrip;
use super::demand::ZoneId;
use super::geometry::centroid;
use super::geometry::Point2d;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ZoneRole {
    Origin,
    Destination,
}

impl ZoneRole {
    fn other(&self) -> ZoneRole {
        match self {
            ZoneRole::Origin => ZoneRole::Destination,
            ZoneRole::Destination => ZoneRole::Origin,
        }
    }
}

/// Deterministic stand-in coordinates for zones that have no observed trips: zones are laid out
/// row by row on a square grid centred on `center`.
#[derive(PartialEq, Debug, Clone)]
pub struct SyntheticGrid {
    pub center: Point2d,
    pub spacing_m: f64,
    pub columns: u32,
}

impl Default for SyntheticGrid {
    fn default() -> SyntheticGrid {
        SyntheticGrid {
            center: Point2d::new(940461., 1911792.),
            spacing_m: 300.,
            columns: 9,
        }
    }
}

impl SyntheticGrid {
    pub fn coordinate(&self, zone: ZoneId) -> Point2d {
        let columns = self.columns.max(1) as i64;
        let half = columns / 2;
        // zone ids start at 1
        let offset = zone as i64 - 1;
        let row = offset.div_euclid(columns);
        let col = offset.rem_euclid(columns);
        Point2d::new(self.center.x_coord + (col - half) as f64 * self.spacing_m,
                     self.center.y_coord + (row - half) as f64 * self.spacing_m)
    }
}

/// Coordinates for every zone a pattern or its real-time trips mention. Built once per pattern
/// and only read afterwards.
pub struct ZoneRegistry {
    origin_coords: BTreeMap<ZoneId, Vec<Point2d>>,
    destination_coords: BTreeMap<ZoneId, Vec<Point2d>>,
    synthetic_coords: BTreeMap<ZoneId, Point2d>,
    zone_ids: BTreeSet<ZoneId>,
    kdtree: KdTree<f64, ZoneId, [f64; 2]>,
    grid: SyntheticGrid,
}

impl ZoneRegistry {
    pub fn build(pattern_zones: &BTreeSet<ZoneId>, trips: &[RealTimeTrip], grid: &SyntheticGrid)
                 -> ZoneRegistry {
        let mut origin_coords: BTreeMap<ZoneId, Vec<Point2d>> = BTreeMap::new();
        let mut destination_coords: BTreeMap<ZoneId, Vec<Point2d>> = BTreeMap::new();
        for trip in trips {
            origin_coords.entry(trip.origin_zone).or_insert(vec![]).push(trip.origin);
            destination_coords.entry(trip.destination_zone).or_insert(vec![])
                .push(trip.destination);
        }

        let mut zone_ids = pattern_zones.clone();
        zone_ids.extend(origin_coords.keys().cloned());
        zone_ids.extend(destination_coords.keys().cloned());

        let mut synthetic_coords = BTreeMap::new();
        for zone in &zone_ids {
            if !origin_coords.contains_key(zone) && !destination_coords.contains_key(zone) {
                synthetic_coords.insert(*zone, grid.coordinate(*zone));
            }
        }
        if !synthetic_coords.is_empty() {
            log::info!("{} of {} zones have no observed coordinates, using grid positions",
                       synthetic_coords.len(), zone_ids.len());
        }

        // repeated observations of the same spot add nothing to the nearest-zone lookup
        let mut seen = BTreeSet::new();
        let mut kdtree = KdTree::new(2);
        let recorded = origin_coords.iter().chain(destination_coords.iter())
            .flat_map(|(zone, coords)| coords.iter().map(move |cc| (*zone, *cc)))
            .chain(synthetic_coords.iter().map(|(zone, cc)| (*zone, *cc)));
        for (zone, coord) in recorded {
            if !seen.insert((zone, coord.rounded())) {
                continue;
            }
            if let Err(err) = kdtree.add(coord.as_array(), zone) {
                log::warn!("could not index coordinate {:?} of zone {}: {:?}", coord, zone, err);
            }
        }

        ZoneRegistry {
            origin_coords,
            destination_coords,
            synthetic_coords,
            zone_ids,
            kdtree,
            grid: grid.clone(),
        }
    }

    pub fn for_pattern(pattern: &DemandPattern, trips: &[RealTimeTrip], grid: &SyntheticGrid)
                       -> ZoneRegistry {
        ZoneRegistry::build(pattern.zones(), trips, grid)
    }

    pub fn zone_ids(&self) -> &BTreeSet<ZoneId> {
        &self.zone_ids
    }

    pub fn contains(&self, zone: ZoneId) -> bool {
        self.zone_ids.contains(&zone)
    }

    pub fn is_synthetic(&self, zone: ZoneId) -> bool {
        self.synthetic_coords.contains_key(&zone)
    }

    pub fn num_synthetic(&self) -> usize {
        self.synthetic_coords.len()
    }

    fn observed(&self, zone: ZoneId, role: ZoneRole) -> Option<&Vec<Point2d>> {
        let coords = match role {
            ZoneRole::Origin => &self.origin_coords,
            ZoneRole::Destination => &self.destination_coords,
        };
        coords.get(&zone).filter(|cc| !cc.is_empty())
    }

    /// Observed coordinates for the role, else for the other role.
    fn observed_with_fallback(&self, zone: ZoneId, role: ZoneRole) -> Option<&Vec<Point2d>> {
        self.observed(zone, role).or_else(|| self.observed(zone, role.other()))
    }

    fn synthetic(&self, zone: ZoneId) -> Point2d {
        match self.synthetic_coords.get(&zone) {
            Some(coord) => *coord,
            None => self.grid.coordinate(zone),
        }
    }

    /// A random observed coordinate of the zone, or its grid position if it has none.
    pub fn sample_coordinate<R: Rng + ?Sized>(&self, zone: ZoneId, role: ZoneRole, rng: &mut R)
                                              -> Point2d {
        match self.observed_with_fallback(zone, role).and_then(|cc| cc.choose(rng)) {
            Some(coord) => *coord,
            None => self.synthetic(zone),
        }
    }

    /// The centroid of the zone's observed coordinates, or its grid position.
    pub fn representative(&self, zone: ZoneId, role: ZoneRole) -> Point2d {
        self.observed_with_fallback(zone, role)
            .and_then(|cc| centroid(cc))
            .unwrap_or_else(|| self.synthetic(zone))
    }

    /// The zone owning the recorded coordinate closest to `point`.
    pub fn nearest_zone(&self, point: &Point2d) -> Option<ZoneId> {
        match self.kdtree.nearest(&point.as_array(), 1, &squared_euclidean) {
            Ok(found) => found.first().map(|(_, zone)| **zone),
            Err(err) => {
                log::warn!("nearest zone lookup failed for {:?}: {:?}", point, err);
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::seeded_rng;
    use crate::test_utils::real_time_trip;

    #[test]
    fn test_synthetic_grid_layout() {
        let grid = SyntheticGrid::default();
        assert_eq!(grid.coordinate(1), Point2d::new(940461. - 1200., 1911792. - 1200.));
        assert_eq!(grid.coordinate(41), Point2d::new(940461., 1911792.));
        assert_eq!(grid.coordinate(10), Point2d::new(940461. - 1200., 1911792. - 900.));
    }

    #[test]
    fn test_role_and_grid_fallback() {
        let trips = vec![
            real_time_trip(1, 2, Point2d::new(0., 0.), Point2d::new(1000., 0.), 8. * 3600.),
            real_time_trip(1, 2, Point2d::new(10., 0.), Point2d::new(1010., 0.), 8. * 3600.),
        ];
        let zones: BTreeSet<ZoneId> = vec![1, 2, 41].into_iter().collect();
        let registry = ZoneRegistry::build(&zones, &trips, &SyntheticGrid::default());
        let mut rng = seeded_rng(5);

        assert_eq!(registry.zone_ids().len(), 3);
        assert!(registry.is_synthetic(41));
        assert!(!registry.is_synthetic(2));
        assert_eq!(registry.representative(1, ZoneRole::Origin), Point2d::new(5., 0.));
        // zone 2 was never an origin, so the destination observations stand in
        assert_eq!(registry.representative(2, ZoneRole::Origin), Point2d::new(1005., 0.));
        assert_eq!(registry.sample_coordinate(41, ZoneRole::Destination, &mut rng),
                   Point2d::new(940461., 1911792.));
        let sampled = registry.sample_coordinate(1, ZoneRole::Origin, &mut rng);
        assert!(sampled == Point2d::new(0., 0.) || sampled == Point2d::new(10., 0.));
    }

    #[test]
    fn test_nearest_zone() {
        let trips = vec![
            real_time_trip(1, 2, Point2d::new(0., 0.), Point2d::new(1000., 0.), 8. * 3600.),
        ];
        let registry = ZoneRegistry::build(&BTreeSet::new(), &trips, &SyntheticGrid::default());
        assert_eq!(registry.nearest_zone(&Point2d::new(100., 50.)), Some(1));
        assert_eq!(registry.nearest_zone(&Point2d::new(900., -50.)), Some(2));
    }
}
