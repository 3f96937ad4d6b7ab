use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Value standing for "no value" on a single axis of an [`XYZ`].
///
/// A plain number rather than `NaN` so that absent values compare and
/// serialize deterministically.
pub const NULL_DOUBLE: f64 = 1e308;

/// Tolerance applied to interpolation fractions when locating edge intercepts.
const INTERCEPT_EPSILON: f64 = 1e-10;

/// A 3D point or vector in project grid coordinates.
///
/// Any axis may hold [`NULL_DOUBLE`]. Arithmetic does not special case the
/// sentinel: callers check [`XYZ::is_null`] before doing math.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct XYZ {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for XYZ {
    fn default() -> Self {
        XYZ::null()
    }
}

impl XYZ {
    pub const fn new(x: f64, y: f64, z: f64) -> XYZ {
        XYZ { x, y, z }
    }

    /// A plan point with no elevation.
    pub const fn new_2d(x: f64, y: f64) -> XYZ {
        XYZ { x, y, z: NULL_DOUBLE }
    }

    pub const fn null() -> XYZ {
        XYZ {
            x: NULL_DOUBLE,
            y: NULL_DOUBLE,
            z: NULL_DOUBLE,
        }
    }

    /// True if every axis is absent.
    pub fn is_null(&self) -> bool {
        self.x == NULL_DOUBLE && self.y == NULL_DOUBLE && self.z == NULL_DOUBLE
    }

    /// True if either plan axis is absent.
    pub fn is_null_in_plan(&self) -> bool {
        self.x == NULL_DOUBLE || self.y == NULL_DOUBLE
    }

    pub fn dot_product(self, other: XYZ) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross_product(self, other: XYZ) -> XYZ {
        XYZ::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Plan dot product of `self` with the perpendicular of `other`.
    ///
    /// Positive when `other` lies counter-clockwise of `self`.
    pub fn perp_dot_product(self, other: XYZ) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f64 {
        self.dot_product(self).sqrt()
    }

    pub fn plan_length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Returns the vector scaled to unit length, or `None` for a zero vector.
    pub fn unit_vector(self) -> Option<XYZ> {
        let length = self.length();
        if length == 0.0 {
            None
        } else {
            Some(self * (1.0 / length))
        }
    }

    pub fn plan_distance(self, other: XYZ) -> f64 {
        (self - other).plan_length()
    }

    /// Strict point in triangle test for a counter-clockwise triangle.
    ///
    /// A point exactly on an edge is outside.
    pub fn point_in_triangle(p1: XYZ, p2: XYZ, p3: XYZ, x: f64, y: f64) -> bool {
        let point = XYZ::new_2d(x, y);
        let sides = edge_sides(p1, p2, p3, point);
        sides.iter().all(|&side| side > 0.0)
    }

    /// Point in triangle test accepting points on edges and either winding.
    pub fn point_in_triangle_inclusive(p1: XYZ, p2: XYZ, p3: XYZ, x: f64, y: f64) -> bool {
        let point = XYZ::new_2d(x, y);
        let sides = edge_sides(p1, p2, p3, point);
        sides.iter().all(|&side| side >= 0.0) || sides.iter().all(|&side| side <= 0.0)
    }

    /// Interpolates the elevation of the triangle `p1 p2 p3` at `(x, y)`.
    ///
    /// For a pair of edges, the intercepts of both edges with the vertical
    /// line through `x` are computed, then `z` is interpolated between the
    /// two intercepts at `y`. Edge pairs are tried in turn until one
    /// brackets the point. Returns `None` when no pair does, which is the
    /// case for any point outside the triangle.
    pub fn triangle_height(p1: XYZ, p2: XYZ, p3: XYZ, x: f64, y: f64) -> Option<f64> {
        let edge_pairs = [
            ((p1, p2), (p1, p3)),
            ((p1, p2), (p2, p3)),
            ((p1, p3), (p2, p3)),
        ];
        edge_pairs
            .iter()
            .find_map(|&(first, second)| height_between_edges(first, second, x, y))
    }
}

fn edge_sides(p1: XYZ, p2: XYZ, p3: XYZ, point: XYZ) -> [f64; 3] {
    [
        (p2 - p1).perp_dot_product(point - p1),
        (p3 - p2).perp_dot_product(point - p2),
        (p1 - p3).perp_dot_product(point - p3),
    ]
}

fn fraction_in_unit_range(fraction: f64) -> bool {
    (-INTERCEPT_EPSILON..=1.0 + INTERCEPT_EPSILON).contains(&fraction)
}

/// Intercept `(y, z)` of the edge `a b` with the vertical line through `x`.
fn edge_intercept_at_x((a, b): (XYZ, XYZ), x: f64) -> Option<(f64, f64)> {
    let dx = b.x - a.x;
    if dx == 0.0 {
        return None;
    }
    let fraction = (x - a.x) / dx;
    if !fraction_in_unit_range(fraction) {
        return None;
    }
    Some((a.y + fraction * (b.y - a.y), a.z + fraction * (b.z - a.z)))
}

fn height_between_edges(first: (XYZ, XYZ), second: (XYZ, XYZ), x: f64, y: f64) -> Option<f64> {
    let (y1, z1) = edge_intercept_at_x(first, x)?;
    let (y2, z2) = edge_intercept_at_x(second, x)?;
    let dy = y2 - y1;
    if dy.abs() < INTERCEPT_EPSILON {
        return if (y - y1).abs() < INTERCEPT_EPSILON {
            Some(z1)
        } else {
            None
        };
    }
    let fraction = (y - y1) / dy;
    if !fraction_in_unit_range(fraction) {
        return None;
    }
    Some(z1 + fraction * (z2 - z1))
}

impl Add for XYZ {
    type Output = XYZ;

    fn add(self, other: XYZ) -> XYZ {
        XYZ::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for XYZ {
    type Output = XYZ;

    fn sub(self, other: XYZ) -> XYZ {
        XYZ::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for XYZ {
    type Output = XYZ;

    fn mul(self, factor: f64) -> XYZ {
        XYZ::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

impl Neg for XYZ {
    type Output = XYZ;

    fn neg(self) -> XYZ {
        XYZ::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: XYZ = XYZ::new(0.0, 0.0, 5.0);
    const P2: XYZ = XYZ::new(10.0, 0.0, 5.0);
    const P3: XYZ = XYZ::new(0.0, 10.0, 5.0);

    #[test]
    fn test_null_sentinel() {
        let null = XYZ::null();
        assert!(null.is_null());
        assert!(null.is_null_in_plan());
        assert_eq!(XYZ::default(), null);
        let plan = XYZ::new_2d(1.0, 2.0);
        assert!(!plan.is_null());
        assert!(!plan.is_null_in_plan());
        assert_eq!(plan.z, NULL_DOUBLE);
    }

    #[test]
    fn test_vector_algebra() {
        let a = XYZ::new(1.0, 2.0, 3.0);
        let b = XYZ::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, XYZ::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, XYZ::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, XYZ::new(2.0, 4.0, 6.0));
        assert_eq!(-a, XYZ::new(-1.0, -2.0, -3.0));
        assert_eq!(a.dot_product(b), 32.0);
        assert_eq!(
            XYZ::new(1.0, 0.0, 0.0).cross_product(XYZ::new(0.0, 1.0, 0.0)),
            XYZ::new(0.0, 0.0, 1.0)
        );
        assert_eq!(XYZ::new(3.0, 4.0, 0.0).length(), 5.0);
        assert_eq!(XYZ::new(3.0, 4.0, 12.0).plan_length(), 5.0);
        assert_eq!(XYZ::new(0.0, 0.0, 0.0).unit_vector(), None);
        let unit = XYZ::new(0.0, 0.0, 2.0).unit_vector().unwrap();
        assert_eq!(unit, XYZ::new(0.0, 0.0, 1.0));
        assert_eq!(XYZ::new(0.0, 0.0, 1.0).plan_distance(XYZ::new(3.0, 4.0, 9.0)), 5.0);
    }

    #[test]
    fn test_point_in_triangle_on_edge() {
        // (5, 0) lies on the edge P1 -> P2.
        assert!(!XYZ::point_in_triangle(P1, P2, P3, 5.0, 0.0));
        assert!(XYZ::point_in_triangle_inclusive(P1, P2, P3, 5.0, 0.0));
    }

    #[test]
    fn test_point_in_triangle_inside_and_outside() {
        assert!(XYZ::point_in_triangle(P1, P2, P3, 2.0, 2.0));
        assert!(!XYZ::point_in_triangle(P1, P2, P3, 8.0, 8.0));
        assert!(!XYZ::point_in_triangle_inclusive(P1, P2, P3, 8.0, 8.0));
    }

    #[test]
    fn test_point_in_triangle_inclusive_accepts_clockwise_winding() {
        assert!(!XYZ::point_in_triangle(P1, P3, P2, 2.0, 2.0));
        assert!(XYZ::point_in_triangle_inclusive(P1, P3, P2, 2.0, 2.0));
    }

    #[test]
    fn test_triangle_height_flat_triangle() {
        for &(x, y) in &[(1.0, 1.0), (2.5, 6.0), (9.0, 0.5), (0.5, 9.0), (4.0, 4.0)] {
            assert_eq!(XYZ::triangle_height(P1, P2, P3, x, y), Some(5.0));
        }
    }

    #[test]
    fn test_triangle_height_outside() {
        assert_eq!(XYZ::triangle_height(P1, P2, P3, 20.0, 1.0), None);
        assert_eq!(XYZ::triangle_height(P1, P2, P3, -1.0, 1.0), None);
        // Within the X range, beyond the hypotenuse.
        assert_eq!(XYZ::triangle_height(P1, P2, P3, 6.0, 6.0), None);
    }

    #[test]
    fn test_triangle_height_sloped_triangle() {
        let p1 = XYZ::new(0.0, 0.0, 0.0);
        let p2 = XYZ::new(10.0, 0.0, 10.0);
        let p3 = XYZ::new(0.0, 10.0, 0.0);
        let height = XYZ::triangle_height(p1, p2, p3, 4.0, 2.0).unwrap();
        assert!((height - 4.0).abs() < 1e-9);
        // At the x of a vertex the first pair is degenerate and a later pair resolves it.
        let height = XYZ::triangle_height(p1, p2, p3, 0.0, 5.0).unwrap();
        assert!(height.abs() < 1e-9);
    }
}
