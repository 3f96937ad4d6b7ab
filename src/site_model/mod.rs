//! Site models and the providers queries resolve them from.
//!
//! A [`SiteModel`] is an immutable snapshot. Queries hold an
//! `Arc<SiteModel>` for their whole lifetime; ingestion publishes new
//! snapshots through a [`SiteModels`] registry instead of mutating the one
//! a query may be reading.

mod provider;
mod registry;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use self::provider::{DesignExistenceMapProvider, ExistenceMapKind, SiteModelProvider};
pub use self::registry::{ExistenceMaps, SiteModels};
use crate::geometry::BoundingWorldExtent3D;
use crate::subgrid_tree::SubGridTreeBitMask;

/// A point-in-time scanned reference surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurveyedSurface {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub as_at_date: OffsetDateTime,
    pub extents: BoundingWorldExtent3D,
}

impl SurveyedSurface {
    pub fn new(id: Uuid, as_at_date: OffsetDateTime, extents: BoundingWorldExtent3D) -> SurveyedSurface {
        SurveyedSurface {
            id,
            as_at_date,
            extents,
        }
    }
}

/// Project level container of production data and surveyed surfaces.
#[derive(Clone, Debug)]
pub struct SiteModel {
    id: Uuid,
    cell_size: f64,
    existence_map: Arc<SubGridTreeBitMask>,
    production_data_extents: BoundingWorldExtent3D,
    surveyed_surfaces: Vec<SurveyedSurface>,
}

impl SiteModel {
    /// Creates a site model without any data.
    pub fn new(id: Uuid, cell_size: f64) -> SiteModel {
        SiteModel {
            id,
            cell_size,
            existence_map: Arc::new(SubGridTreeBitMask::new(cell_size)),
            production_data_extents: BoundingWorldExtent3D::inverted(),
            surveyed_surfaces: Vec::new(),
        }
    }

    /// Replaces the production data existence map.
    ///
    /// The production data extents become the world extent of the
    /// sub-grids flagged in `existence_map`.
    pub fn with_existence_map(mut self, existence_map: SubGridTreeBitMask) -> SiteModel {
        self.production_data_extents = world_extent_of(&existence_map);
        self.existence_map = Arc::new(existence_map);
        self
    }

    pub fn with_surveyed_surfaces(mut self, surveyed_surfaces: Vec<SurveyedSurface>) -> SiteModel {
        self.surveyed_surfaces = surveyed_surfaces;
        self
    }

    /// Returns a copy of this model with the given sub-grids flagged as
    /// holding production data.
    ///
    /// `self` is left untouched.
    pub fn with_marked_sub_grids<I>(&self, sub_grid_keys: I) -> SiteModel
    where I: IntoIterator<Item = (u32, u32)> {
        let mut existence_map = SubGridTreeBitMask::clone(&self.existence_map);
        for (x, y) in sub_grid_keys {
            existence_map.set_cell(x, y, true);
        }
        self.clone().with_existence_map(existence_map)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Existence map of the production data, shared read-only.
    pub fn existence_map(&self) -> &Arc<SubGridTreeBitMask> {
        &self.existence_map
    }

    pub fn surveyed_surfaces(&self) -> &[SurveyedSurface] {
        &self.surveyed_surfaces
    }

    pub fn production_data_extents(&self) -> BoundingWorldExtent3D {
        self.production_data_extents
    }

    /// Extent of the production data and of every surveyed surface whose
    /// identifier is not in `excluded_surveyed_surfaces`.
    ///
    /// The result is inverted for a model without any data.
    pub fn adjusted_spatial_extents(&self, excluded_surveyed_surfaces: &[Uuid]) -> BoundingWorldExtent3D {
        let mut extents = self.production_data_extents;
        for surveyed_surface in &self.surveyed_surfaces {
            if !excluded_surveyed_surfaces.contains(&surveyed_surface.id) {
                extents.include_extent(&surveyed_surface.extents);
            }
        }
        extents
    }
}

fn world_extent_of(existence_map: &SubGridTreeBitMask) -> BoundingWorldExtent3D {
    let cell_extent = existence_map.full_cell_extent();
    if !cell_extent.is_valid_extent() {
        return BoundingWorldExtent3D::inverted();
    }
    let mut extents = existence_map.cell_extent(cell_extent.min_x as u32, cell_extent.min_y as u32);
    extents.include_extent(&existence_map.cell_extent(cell_extent.max_x as u32, cell_extent.max_y as u32));
    extents
}
