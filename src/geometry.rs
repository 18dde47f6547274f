//! 2D geometry vocabulary shared across the pipeline stages.
//!
//! All coordinates are double-precision millimetres. Directions are unit
//! vectors; a direction is *dirless* when its sign is not meaningful (line
//! tangents), in which case comparisons fold antipodal vectors together.

use serde::{Deserialize, Serialize};

/// Epsilon used for coordinate quantisation and degeneracy checks (mm).
pub const GEOM_EPS: f64 = 1e-6;

/// A 2D point in drawing coordinates (millimetres).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Lexicographic (x, then y) comparison used to canonicalise endpoint order.
    #[inline]
    pub fn lex_le(&self, other: &Point) -> bool {
        (self.x, self.y) <= (other.x, other.y)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An ordered pair of points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub p1: Point,
    pub p2: Point,
}

impl Segment {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.p1.distance_to(&self.p2)
    }

    #[inline]
    pub fn midpoint(&self) -> Point {
        Point::new(0.5 * (self.p1.x + self.p2.x), 0.5 * (self.p1.y + self.p2.y))
    }

    /// Unit direction from `p1` towards `p2`; `[0, 0]` for degenerate segments.
    pub fn direction(&self) -> [f64; 2] {
        let len = self.length();
        if len > 0.0 {
            [(self.p2.x - self.p1.x) / len, (self.p2.y - self.p1.y) / len]
        } else {
            [0.0, 0.0]
        }
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.length() < GEOM_EPS
    }
}

/// Axis-aligned bounding box. Invariant: `min_x <= max_x`, `min_y <= max_y`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box covering `points`. Returns `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            bbox.expand_to(p);
        }
        Some(bbox)
    }

    pub fn expand_to(&mut self, p: &Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn padded(&self, margin: f64) -> BBox {
        BBox::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    #[inline]
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    #[inline]
    pub fn center(&self) -> Point {
        Point::new(0.5 * (self.min_x + self.max_x), 0.5 * (self.min_y + self.max_y))
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn translated(&self, dx: f64, dy: f64) -> BBox {
        BBox::new(self.min_x + dx, self.min_y + dy, self.max_x + dx, self.max_y + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }
}

/// Rotates a unit direction by 90° counter-clockwise.
#[inline]
pub fn perp(u: [f64; 2]) -> [f64; 2] {
    [-u[1], u[0]]
}

#[inline]
pub fn dot(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

/// Unsigned angle between two directions treating antipodal vectors as equal.
/// Returns degrees in `[0, 90]`.
pub fn angle_between_dirless_deg(a: [f64; 2], b: [f64; 2]) -> f64 {
    dot(a, b).abs().clamp(0.0, 1.0).acos().to_degrees()
}

/// Folds a direction so its angle lies in `[0°, 180°)`; keeps band keys stable
/// under endpoint-order flips.
pub fn canonical_direction(u: [f64; 2]) -> [f64; 2] {
    if u[1] < 0.0 || (u[1] == 0.0 && u[0] < 0.0) {
        [-u[0], -u[1]]
    } else {
        u
    }
}

/// Orders four corners counter-clockwise by angle from their centroid.
pub fn order_quad_corners(corners: [Point; 4]) -> [Point; 4] {
    let cx = corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = corners.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mut with_angle: Vec<(Point, f64)> = corners
        .iter()
        .map(|p| (*p, (p.y - cy).atan2(p.x - cx)))
        .collect();
    with_angle.sort_by(|a, b| a.1.total_cmp(&b.1));
    [
        with_angle[0].0,
        with_angle[1].0,
        with_angle[2].0,
        with_angle[3].0,
    ]
}

/// Ray-casting point-in-polygon test. Points on the boundary are not inside.
pub fn point_strictly_in_quad(p: &Point, quad: &[Point; 4]) -> bool {
    let mut inside = false;
    let mut j = 3;
    for i in 0..4 {
        let (pi, pj) = (&quad[i], &quad[j]);
        if (pi.y > p.y) != (pj.y > p.y) {
            let x_cross = pi.x + (p.y - pi.y) / (pj.y - pi.y) * (pj.x - pi.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// True when `p` lies inside the CCW-ordered convex quad, allowing it to sit
/// up to `tol` outside any edge.
pub fn point_in_quad_with_tol(p: &Point, quad: &[Point; 4], tol: f64) -> bool {
    for i in 0..4 {
        let a = &quad[i];
        let b = &quad[(i + 1) % 4];
        let ex = b.x - a.x;
        let ey = b.y - a.y;
        let elen = (ex * ex + ey * ey).sqrt();
        if elen < GEOM_EPS {
            continue;
        }
        let cross = ex * (p.y - a.y) - ey * (p.x - a.x);
        if cross / elen < -tol {
            return false;
        }
    }
    true
}

/// Signed area of a CCW-ordered quad (shoelace). Negative for CW input.
pub fn quad_area(quad: &[Point; 4]) -> f64 {
    let mut acc = 0.0;
    let mut j = 3;
    for i in 0..4 {
        acc += (quad[j].x + quad[i].x) * (quad[j].y - quad[i].y);
        j = i;
    }
    (acc * 0.5).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn segment_direction_and_length() {
        let s = Segment::new(Point::new(0.0, 0.0), Point::new(3.0, 4.0));
        assert!(approx_eq(s.length(), 5.0));
        let d = s.direction();
        assert!(approx_eq(d[0], 0.6) && approx_eq(d[1], 0.8));
    }

    #[test]
    fn dirless_angle_folds_antipodal() {
        assert!(approx_eq(
            angle_between_dirless_deg([1.0, 0.0], [-1.0, 0.0]),
            0.0
        ));
        assert!(approx_eq(
            angle_between_dirless_deg([1.0, 0.0], [0.0, 1.0]),
            90.0
        ));
    }

    #[test]
    fn canonical_direction_folds_lower_half() {
        assert_eq!(canonical_direction([0.0, -1.0]), [0.0, 1.0]);
        assert_eq!(canonical_direction([-1.0, 0.0]), [1.0, 0.0]);
        assert_eq!(canonical_direction([0.5, 0.5]), [0.5, 0.5]);
    }

    #[test]
    fn quad_ordering_is_ccw() {
        let quad = order_quad_corners([
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(approx_eq(quad_area(&quad), 100.0));
    }

    #[test]
    fn midpoint_ray_cast() {
        let quad = order_quad_corners([
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 50.0),
            Point::new(0.0, 50.0),
        ]);
        assert!(point_strictly_in_quad(&Point::new(50.0, 25.0), &quad));
        assert!(!point_strictly_in_quad(&Point::new(150.0, 25.0), &quad));
        assert!(!point_strictly_in_quad(&Point::new(50.0, -1.0), &quad));
    }

    #[test]
    fn containment_tolerance() {
        let quad = order_quad_corners([
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 50.0),
            Point::new(0.0, 50.0),
        ]);
        assert!(point_in_quad_with_tol(&Point::new(-0.5, 25.0), &quad, 1.0));
        assert!(!point_in_quad_with_tol(&Point::new(-2.0, 25.0), &quad, 1.0));
    }

    #[test]
    fn bbox_union_and_intersection() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 20.0, 20.0);
        assert!(a.intersects(&b));
        let u = a.union(&b);
        assert_eq!(u, BBox::new(0.0, 0.0, 20.0, 20.0));
        assert!(!a.intersects(&BBox::new(11.0, 0.0, 12.0, 10.0)));
    }
}
