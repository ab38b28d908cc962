use super::geometry::Point2d;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Converts between geodetic (longitude, latitude in degrees) and the projected metric frame
/// the pipeline works in.
pub trait CoordinateTransform: Sync {
    fn to_projected(&self, geodetic: &Point2d) -> Point2d;
    fn to_geodetic(&self, projected: &Point2d) -> Point2d;
}

/// For inputs that are already in the working frame.
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn to_projected(&self, geodetic: &Point2d) -> Point2d {
        *geodetic
    }

    fn to_geodetic(&self, projected: &Point2d) -> Point2d {
        *projected
    }
}

/// Equirectangular projection about a reference point. Accurate to well under a metre across a
/// city-sized study area, which is all the zone jitter needs.
#[derive(PartialEq, Debug, Clone)]
pub struct LocalTangentPlane {
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl LocalTangentPlane {
    pub fn new(origin_lon: f64, origin_lat: f64, false_easting: f64, false_northing: f64)
               -> LocalTangentPlane {
        LocalTangentPlane {
            origin_lon,
            origin_lat,
            false_easting,
            false_northing,
        }
    }

    fn metres_per_degree_lon(&self) -> f64 {
        EARTH_RADIUS_M * self.origin_lat.to_radians().cos() * std::f64::consts::PI / 180.
    }

    fn metres_per_degree_lat(&self) -> f64 {
        EARTH_RADIUS_M * std::f64::consts::PI / 180.
    }
}

impl CoordinateTransform for LocalTangentPlane {
    fn to_projected(&self, geodetic: &Point2d) -> Point2d {
        let dlon = geodetic.x_coord - self.origin_lon;
        let dlat = geodetic.y_coord - self.origin_lat;
        Point2d::new(self.false_easting + dlon * self.metres_per_degree_lon(),
                     self.false_northing + dlat * self.metres_per_degree_lat())
    }

    fn to_geodetic(&self, projected: &Point2d) -> Point2d {
        let dx = projected.x_coord - self.false_easting;
        let dy = projected.y_coord - self.false_northing;
        Point2d::new(self.origin_lon + dx / self.metres_per_degree_lon(),
                     self.origin_lat + dy / self.metres_per_degree_lat())
    }
}

/// True if the point can only be a longitude/latitude pair.
pub fn looks_geodetic(point: &Point2d) -> bool {
    point.x_coord.abs() <= 180. && point.y_coord.abs() <= 90.
}

/// Returns (geodetic, projected) for a raw coordinate that may be in either frame.
pub fn both_frames(raw: &Point2d, transform: &dyn CoordinateTransform) -> (Point2d, Point2d) {
    if looks_geodetic(raw) {
        (*raw, transform.to_projected(raw))
    } else {
        (transform.to_geodetic(raw), *raw)
    }
}
