//! Polygon boundaries used by spatial filters.
//!
//! A [`Fence`] is built once per query from filter input and is only read
//! once the query starts scanning. Containment uses a crossing-number ray
//! cast along the horizontal line through the test point. Fences with fewer
//! than three vertices are *null*: they contain nothing and intersect nothing.

use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingWorldExtent3D, XYZ};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fence {
    points: Vec<XYZ>,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    is_rectangle: bool,
}

impl Fence {
    pub fn new() -> Fence {
        Fence::default()
    }

    /// Builds a fence from plan vertices, in order.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Fence {
        let mut fence = Fence::new();
        for (x, y) in points {
            fence.points.push(XYZ::new_2d(x, y));
        }
        fence.update_extents();
        fence
    }

    /// Builds a rectangular fence.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Fence {
        let mut fence = Fence::new();
        fence.set_extents(min_x, min_y, max_x, max_y);
        fence
    }

    pub fn points(&self) -> &[XYZ] {
        &self.points
    }

    pub fn num_vertices(&self) -> usize {
        self.points.len()
    }

    /// A null fence has too few vertices to enclose any area.
    pub fn is_null(&self) -> bool {
        self.points.len() < 3
    }

    pub fn is_rectangle(&self) -> bool {
        self.is_rectangle
    }

    pub fn is_square(&self) -> bool {
        self.is_rectangle
            && self.points.len() == 4
            && (self.max_x - self.min_x) == (self.max_y - self.min_y)
    }

    /// Appends a vertex. The fence stops being considered a rectangle.
    pub fn add_point(&mut self, point: XYZ) {
        self.points.push(point);
        self.is_rectangle = false;
        self.update_extents();
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.is_rectangle = false;
        self.update_extents();
    }

    /// Makes `self` a copy of `source`.
    pub fn assign(&mut self, source: &Fence) {
        self.points.clear();
        self.points.extend_from_slice(&source.points);
        self.is_rectangle = source.is_rectangle;
        self.update_extents();
    }

    /// Replaces the vertices with the four corners of the given box.
    pub fn set_extents(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        self.points.clear();
        self.points.push(XYZ::new_2d(min_x, min_y));
        self.points.push(XYZ::new_2d(min_x, max_y));
        self.points.push(XYZ::new_2d(max_x, max_y));
        self.points.push(XYZ::new_2d(max_x, min_y));
        self.update_extents();
        self.is_rectangle = true;
    }

    pub fn set_rectangle_fence(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) {
        self.set_extents(min_x, min_y, max_x, max_y);
    }

    /// Recomputes the cached bounding box from the vertices.
    pub fn update_extents(&mut self) {
        let mut extent = BoundingWorldExtent3D::inverted();
        for point in &self.points {
            extent.include_point(point.x, point.y);
        }
        self.min_x = extent.min_x;
        self.min_y = extent.min_y;
        self.max_x = extent.max_x;
        self.max_y = extent.max_y;
    }

    /// Bounding box of the fence. Inverted for a fence without vertices.
    pub fn extents(&self) -> BoundingWorldExtent3D {
        BoundingWorldExtent3D::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Returns true if `(x, y)` is inside the fence.
    ///
    /// Counts the crossings of the fence with the horizontal half line
    /// extending left of the point. A crossing through a vertex counts only
    /// if the fence continues to the other side of the line there.
    pub fn includes_point(&self, x: f64, y: f64) -> bool {
        if self.is_null() {
            return false;
        }
        if x < self.min_x || x > self.max_x || y < self.min_y || y > self.max_y {
            return false;
        }
        if self.is_rectangle {
            return true;
        }
        self.count_crossings_left_of(x, y)
            .map(|crossings| crossings % 2 == 1)
            .unwrap_or(false)
    }

    fn count_crossings_left_of(&self, x: f64, y: f64) -> Option<usize> {
        let num_points = self.points.len();
        let mut crossings = 0;
        for i in 0..num_points {
            let start = self.points[i];
            let end = self.points[(i + 1) % num_points];
            if start.y == end.y {
                continue;
            }
            if y < start.y.min(end.y) || y > start.y.max(end.y) {
                continue;
            }
            // A vertex lying on the line is decided once, by the edge that ends on it.
            if start.y == y {
                continue;
            }
            let intercept_x = start.x + (y - start.y) * (end.x - start.x) / (end.y - start.y);
            if !intercept_x.is_finite() {
                return None;
            }
            if intercept_x >= x {
                continue;
            }
            if end.y == y && !self.continues_across_line(i, y)? {
                continue;
            }
            crossings += 1;
        }
        Some(crossings)
    }

    /// Given the edge `i -> i + 1` ending on the horizontal line `y`, returns
    /// true if the boundary leaves that line on the opposite side to the one
    /// it arrived from. Vertices lying on the line are skipped over.
    fn continues_across_line(&self, edge_index: usize, y: f64) -> Option<bool> {
        let num_points = self.points.len();
        let arrival_side = self.points[edge_index].y - y;
        let departure_side = (2..=num_points)
            .map(|offset| self.points[(edge_index + offset) % num_points].y - y)
            .find(|side| *side != 0.0)?;
        Some(arrival_side.signum() != departure_side.signum())
    }

    /// Returns true if either end of the segment is inside the fence or the
    /// segment crosses any fence edge.
    pub fn includes_line(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
        if self.is_null() {
            return false;
        }
        if self.includes_point(x1, y1) || self.includes_point(x2, y2) {
            return true;
        }
        let from = XYZ::new_2d(x1, y1);
        let to = XYZ::new_2d(x2, y2);
        self.edges()
            .any(|(start, end)| segments_intersect(start, end, from, to))
    }

    /// Returns true if the fence and the extent overlap in plan.
    pub fn intersects_extent(&self, extent: &BoundingWorldExtent3D) -> bool {
        if self.is_null() || !extent.is_valid_plan_extent() {
            return false;
        }
        if !extent.intersects(&self.extents()) {
            return false;
        }
        let corners = extent_corners(extent);
        if corners
            .iter()
            .any(|corner| self.includes_point(corner.x, corner.y))
        {
            return true;
        }
        if self
            .points
            .iter()
            .any(|point| extent.includes(point.x, point.y))
        {
            return true;
        }
        let extent_edges = [
            (corners[0], corners[1]),
            (corners[1], corners[2]),
            (corners[2], corners[3]),
            (corners[3], corners[0]),
        ];
        self.edges().any(|(start, end)| {
            extent_edges
                .iter()
                .any(|&(from, to)| segments_intersect(start, end, from, to))
        })
    }

    /// Returns true if the whole extent lies inside the fence.
    pub fn includes_extent(&self, extent: &BoundingWorldExtent3D) -> bool {
        if self.is_null() || !extent.is_valid_plan_extent() {
            return false;
        }
        if self.is_rectangle {
            return self.extents().encloses(extent);
        }
        let corners = extent_corners(extent);
        corners
            .iter()
            .all(|corner| self.includes_point(corner.x, corner.y))
            && !corners.iter().enumerate().any(|(i, &from)| {
                let to = corners[(i + 1) % corners.len()];
                self.edges().any(|(start, end)| segments_cross(start, end, from, to))
            })
    }

    /// Plan area enclosed by the fence.
    pub fn area(&self) -> f64 {
        if self.is_null() {
            return 0.0;
        }
        let reference_y = self.points[self.points.len() - 1].y;
        let doubled: f64 = self
            .edges()
            .map(|(start, end)| (end.x - start.x) * ((start.y - reference_y) + (end.y - reference_y)))
            .sum();
        (doubled / 2.0).abs()
    }

    fn edges(&self) -> impl Iterator<Item = (XYZ, XYZ)> + '_ {
        let num_points = self.points.len();
        (0..num_points).map(move |i| (self.points[i], self.points[(i + 1) % num_points]))
    }
}

fn extent_corners(extent: &BoundingWorldExtent3D) -> [XYZ; 4] {
    [
        XYZ::new_2d(extent.min_x, extent.min_y),
        XYZ::new_2d(extent.min_x, extent.max_y),
        XYZ::new_2d(extent.max_x, extent.max_y),
        XYZ::new_2d(extent.max_x, extent.min_y),
    ]
}

fn orientation(a: XYZ, b: XYZ, c: XYZ) -> f64 {
    (b - a).perp_dot_product(c - a)
}

fn on_segment(a: XYZ, b: XYZ, p: XYZ) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Segment intersection, touching included.
fn segments_intersect(p1: XYZ, p2: XYZ, q1: XYZ, q2: XYZ) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

/// Proper crossing only: the segments cut each other at an interior point.
fn segments_cross(p1: XYZ, p2: XYZ, q1: XYZ, q2: XYZ) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}
