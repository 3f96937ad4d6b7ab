use serde::{Deserialize, Serialize};

/// Axis aligned box in world (project grid) coordinates.
///
/// A freshly created extent is *inverted*: its minimums are `+∞` and its
/// maximums `-∞`. An inverted extent is empty and is the identity element
/// of [`BoundingWorldExtent3D::include_point`] and
/// [`BoundingWorldExtent3D::include_extent`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingWorldExtent3D {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl Default for BoundingWorldExtent3D {
    fn default() -> Self {
        BoundingWorldExtent3D::inverted()
    }
}

impl BoundingWorldExtent3D {
    /// Creates a plan extent. Z bounds are left inverted.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingWorldExtent3D {
            min_x,
            min_y,
            min_z: f64::INFINITY,
            max_x,
            max_y,
            max_z: f64::NEG_INFINITY,
        }
    }

    pub fn new_3d(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Self {
        BoundingWorldExtent3D {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }

    /// Returns the empty extent.
    pub fn inverted() -> Self {
        BoundingWorldExtent3D::new_3d(
            f64::INFINITY,
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    /// Returns an extent covering the whole plane.
    pub fn maximal() -> Self {
        BoundingWorldExtent3D::new_3d(
            f64::MIN,
            f64::MIN,
            f64::MIN,
            f64::MAX,
            f64::MAX,
            f64::MAX,
        )
    }

    pub fn set_inverted(&mut self) {
        *self = BoundingWorldExtent3D::inverted();
    }

    pub fn set_maximal_coverage(&mut self) {
        *self = BoundingWorldExtent3D::maximal();
    }

    pub fn is_valid_plan_extent(&self) -> bool {
        self.max_x >= self.min_x && self.max_y >= self.min_y
    }

    pub fn is_valid_height_extent(&self) -> bool {
        self.max_z >= self.min_z
    }

    pub fn is_maximal_plan_coverage(&self) -> bool {
        self.min_x == f64::MIN && self.min_y == f64::MIN && self.max_x == f64::MAX && self.max_y == f64::MAX
    }

    pub fn size_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn size_y(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center_x(&self) -> f64 {
        self.min_x + self.size_x() / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.min_y + self.size_y() / 2.0
    }

    /// Plan area. An invalid extent has no area.
    pub fn area(&self) -> f64 {
        if self.is_valid_plan_extent() {
            self.size_x() * self.size_y()
        } else {
            0.0
        }
    }

    pub fn include_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn include_point_3d(&mut self, x: f64, y: f64, z: f64) {
        self.include_point(x, y);
        self.min_z = self.min_z.min(z);
        self.max_z = self.max_z.max(z);
    }

    /// Grows `self` to contain `other`. An inverted `other` leaves `self` untouched.
    pub fn include_extent(&mut self, other: &BoundingWorldExtent3D) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.min_z = self.min_z.min(other.min_z);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
        self.max_z = self.max_z.max(other.max_z);
    }

    /// Shrinks `self` to its plan intersection with `other`.
    ///
    /// Disjoint extents leave `self` invalid (max < min on some axis).
    pub fn intersect(&mut self, other: &BoundingWorldExtent3D) {
        self.min_x = self.min_x.max(other.min_x);
        self.min_y = self.min_y.max(other.min_y);
        self.max_x = self.max_x.min(other.max_x);
        self.max_y = self.max_y.min(other.max_y);
    }

    /// Returns true if the plan projections share at least a point.
    pub fn intersects(&self, other: &BoundingWorldExtent3D) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Returns true if `other` lies entirely within `self` in plan.
    pub fn encloses(&self, other: &BoundingWorldExtent3D) -> bool {
        self.is_valid_plan_extent()
            && other.is_valid_plan_extent()
            && self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn includes(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grows the extent by `dx` on both X sides and `dy` on both Y sides.
    pub fn expand(&mut self, dx: f64, dy: f64) {
        self.min_x -= dx;
        self.max_x += dx;
        self.min_y -= dy;
        self.max_y += dy;
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        self.min_x += dx;
        self.max_x += dx;
        self.min_y += dy;
        self.max_y += dy;
    }
}

/// Axis aligned box over integer cell addresses. Bounds are inclusive.
///
/// The inverted sentinel (`min = i32::MAX`, `max = i32::MIN`) marks an empty extent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BoundingIntegerExtent2D {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Default for BoundingIntegerExtent2D {
    fn default() -> Self {
        BoundingIntegerExtent2D::inverted()
    }
}

impl BoundingIntegerExtent2D {
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        BoundingIntegerExtent2D {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn inverted() -> Self {
        BoundingIntegerExtent2D::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN)
    }

    pub fn maximal() -> Self {
        BoundingIntegerExtent2D::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)
    }

    pub fn set_inverted(&mut self) {
        *self = BoundingIntegerExtent2D::inverted();
    }

    pub fn set_maximal_coverage(&mut self) {
        *self = BoundingIntegerExtent2D::maximal();
    }

    pub fn is_valid_extent(&self) -> bool {
        self.max_x >= self.min_x && self.max_y >= self.min_y
    }

    pub fn size_x(&self) -> i64 {
        i64::from(self.max_x) - i64::from(self.min_x)
    }

    pub fn size_y(&self) -> i64 {
        i64::from(self.max_y) - i64::from(self.min_y)
    }

    /// `size_x * size_y`. Zero for an invalid extent.
    pub fn area(&self) -> i64 {
        if self.is_valid_extent() {
            self.size_x() * self.size_y()
        } else {
            0
        }
    }

    pub fn includes(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn include(&mut self, x: i32, y: i32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn include_extent(&mut self, other: &BoundingIntegerExtent2D) {
        if other.is_valid_extent() {
            self.include(other.min_x, other.min_y);
            self.include(other.max_x, other.max_y);
        }
    }

    pub fn intersect(&mut self, other: &BoundingIntegerExtent2D) {
        self.min_x = self.min_x.max(other.min_x);
        self.min_y = self.min_y.max(other.min_y);
        self.max_x = self.max_x.min(other.max_x);
        self.max_y = self.max_y.min(other.max_y);
    }

    pub fn intersects(&self, other: &BoundingIntegerExtent2D) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn encloses(&self, other: &BoundingIntegerExtent2D) -> bool {
        self.is_valid_extent()
            && other.is_valid_extent()
            && self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    /// Grows the extent by `delta` on every side, saturating at the `i32` range.
    pub fn expand(&mut self, delta: i32) {
        self.min_x = self.min_x.saturating_sub(delta);
        self.min_y = self.min_y.saturating_sub(delta);
        self.max_x = self.max_x.saturating_add(delta);
        self.max_y = self.max_y.saturating_add(delta);
    }
}
