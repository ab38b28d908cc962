/// A position in the projected, metric frame used by every pipeline stage.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Point2d {
    pub x_coord: f64,
    pub y_coord: f64,
}

impl Point2d {
    pub fn new(x_coord: f64, y_coord: f64) -> Point2d {
        Point2d{x_coord, y_coord}
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x_coord, self.y_coord]
    }

    pub fn plus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x_coord + other.x_coord, self.y_coord + other.y_coord)
    }

    pub fn minus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x_coord - other.x_coord, self.y_coord - other.y_coord)
    }

    pub fn times(&self, factor: f64) -> Point2d {
        Point2d::new(self.x_coord * factor, self.y_coord * factor)
    }

    pub fn euclidean_distance(&self, other: &Point2d) -> f64 {
        let diff = self.minus(other);
        (diff.x_coord.powi(2) + diff.y_coord.powi(2)).sqrt()
    }

    /// The point `distance` metres away along `angle` (radians, counter-clockwise from +x).
    pub fn offset_polar(&self, angle: f64, distance: f64) -> Point2d {
        self.plus(&Point2d::new(angle.cos(), angle.sin()).times(distance))
    }

    /// Index of the square grid cell of side `cell_size` that contains this point.
    pub fn grid_cell(&self, cell_size: f64) -> (i64, i64) {
        ((self.x_coord / cell_size).floor() as i64, (self.y_coord / cell_size).floor() as i64)
    }

    /// Both coordinates rounded to whole metres, for comparing positions without float noise.
    pub fn rounded(&self) -> (i64, i64) {
        (self.x_coord.round() as i64, self.y_coord.round() as i64)
    }

    pub fn is_finite(&self) -> bool {
        self.x_coord.is_finite() && self.y_coord.is_finite()
    }
}

/// Arithmetic mean of a set of points, or None if the set is empty.
pub fn centroid(points: &[Point2d]) -> Option<Point2d> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Point2d::new(0., 0.), |acc, pp| acc.plus(pp));
    Some(sum.times(1. / points.len() as f64))
}
