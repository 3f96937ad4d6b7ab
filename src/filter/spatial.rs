use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{BoundingWorldExtent3D, Fence};

/// A circle in project grid coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionalFilter {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl PositionalFilter {
    /// Bounding box of the circle.
    pub fn extents(&self) -> BoundingWorldExtent3D {
        BoundingWorldExtent3D::new(
            self.x - self.radius,
            self.y - self.radius,
            self.x + self.radius,
            self.y + self.radius,
        )
    }
}

/// Spatial restriction of a filter.
///
/// At most one of the fence and the positional restriction is expected to
/// be set. A design mask may be combined with either.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    pub fence: Option<Fence>,
    pub positional: Option<PositionalFilter>,
    /// Design whose existence map masks the sub-grids considered.
    pub design_mask: Option<Uuid>,
}

impl SpatialFilter {
    /// True if the filter restricts the query to a fence. A fence without
    /// vertices restricts nothing.
    pub fn is_spatial(&self) -> bool {
        self.fence.as_ref().is_some_and(|fence| fence.num_vertices() > 0)
    }

    pub fn is_positional(&self) -> bool {
        self.positional.is_some()
    }

    pub fn is_design_mask(&self) -> bool {
        self.design_mask.is_some()
    }

    /// True if any of the fence, positional or design mask restrictions is set.
    pub fn has_restriction(&self) -> bool {
        self.is_spatial() || self.is_positional() || self.is_design_mask()
    }

    /// Plan boundary of the filter, if it has a fence or a positional restriction.
    pub fn boundary(&self) -> Option<BoundingWorldExtent3D> {
        match (&self.fence, &self.positional) {
            (Some(fence), _) if fence.num_vertices() > 0 => Some(fence.extents()),
            (_, Some(positional)) => Some(positional.extents()),
            _ => None,
        }
    }

    /// Narrows `extents` to the filter boundary.
    pub fn calculate_intersection_with_extents(&self, extents: &mut BoundingWorldExtent3D) {
        if let Some(boundary) = self.boundary() {
            extents.intersect(&boundary);
        }
    }

    /// Decides whether a sub-grid may hold cells accepted by this filter.
    ///
    /// `cell_extent` and `cell_center` describe the sub-grid in world
    /// coordinates, `cell_size` is its side length.
    pub fn accepts_sub_grid(
        &self,
        cell_extent: &BoundingWorldExtent3D,
        cell_center: (f64, f64),
        cell_size: f64,
    ) -> bool {
        if let Some(fence) = &self.fence {
            if fence.num_vertices() > 0 {
                return fence.intersects_extent(cell_extent);
            }
        }
        if let Some(positional) = &self.positional {
            let (center_x, center_y) = cell_center;
            let distance = (center_x - positional.x).hypot(center_y - positional.y);
            let half_diagonal = std::f64::consts::SQRT_2 * cell_size / 2.0;
            return distance <= positional.radius + half_diagonal;
        }
        true
    }
}
