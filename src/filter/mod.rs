//! Query filters.
//!
//! A [`CombinedFilter`] pairs the spatial restriction of a query with its
//! attribute criteria. Queries carry one or two of them in a [`FilterSet`]:
//! a single filter for most requests, a base and a top filter for
//! differencing requests.

mod attribute;
mod spatial;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use self::attribute::{AttributeFilter, TimeRange};
pub use self::spatial::{PositionalFilter, SpatialFilter};
use crate::error::RequestErrorStatus;
use crate::geometry::BoundingWorldExtent3D;
use crate::site_model::SurveyedSurface;

/// Spatial and attribute criteria of a query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedFilter {
    pub spatial: SpatialFilter,
    pub attribute: AttributeFilter,
    /// Set when any selection is active. Preparation only runs for such filters.
    #[serde(default)]
    pub any_filter_selections: bool,
}

impl CombinedFilter {
    pub fn new(spatial: SpatialFilter, attribute: AttributeFilter) -> CombinedFilter {
        let any_filter_selections = spatial.has_restriction()
            || attribute.has_time_component()
            || attribute.has_elevation_range_design()
            || !attribute.excluded_assets.is_empty()
            || !attribute.excluded_surveyed_surfaces.is_empty();
        CombinedFilter {
            spatial,
            attribute,
            any_filter_selections,
        }
    }

    /// Validates the filter and refreshes its derived state.
    ///
    /// Fails with [`RequestErrorStatus::InvalidTimeRange`] if the time range
    /// ends before it starts and with
    /// [`RequestErrorStatus::InvalidSpatialFilter`] if the fence has one or
    /// two vertices.
    pub fn prepare_for_query(&mut self) -> Result<(), RequestErrorStatus> {
        if let Some(time_range) = &self.attribute.time_range {
            if !time_range.is_valid() {
                debug!("time range ends before it starts: {time_range:?}");
                return Err(RequestErrorStatus::InvalidTimeRange);
            }
        }
        if let Some(fence) = &mut self.spatial.fence {
            if matches!(fence.num_vertices(), 1 | 2) {
                debug!("fence has {} vertices", fence.num_vertices());
                return Err(RequestErrorStatus::InvalidSpatialFilter);
            }
            fence.update_extents();
        }
        if let Some(positional) = &self.spatial.positional {
            if positional.radius.is_nan() || positional.radius < 0.0 {
                return Err(RequestErrorStatus::InvalidSpatialFilter);
            }
        }
        Ok(())
    }

    /// Keeps the surveyed surfaces selected by this filter.
    ///
    /// A surface is dropped if it is explicitly excluded, or if the filter
    /// has a time range that does not contain its as-at date.
    pub fn filter_surveyed_surfaces<'a>(
        &self,
        surveyed_surfaces: &'a [SurveyedSurface],
    ) -> Vec<&'a SurveyedSurface> {
        surveyed_surfaces
            .iter()
            .filter(|surface| !self.attribute.excludes_surveyed_surface(&surface.id))
            .filter(|surface| match &self.attribute.time_range {
                Some(time_range) => time_range.contains(surface.as_at_date),
                None => true,
            })
            .collect()
    }
}

/// The filters of a query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    filters: Vec<CombinedFilter>,
}

impl From<Vec<CombinedFilter>> for FilterSet {
    fn from(filters: Vec<CombinedFilter>) -> FilterSet {
        FilterSet { filters }
    }
}

impl FilterSet {
    /// A filter set made of a single filter.
    pub fn single(filter: CombinedFilter) -> FilterSet {
        FilterSet {
            filters: vec![filter],
        }
    }

    /// A filter set for differencing queries.
    pub fn base_and_top(base: CombinedFilter, top: CombinedFilter) -> FilterSet {
        FilterSet {
            filters: vec![base, top],
        }
    }

    /// A filter set holding one filter without selections.
    pub fn unfiltered() -> FilterSet {
        FilterSet::single(CombinedFilter::default())
    }

    pub fn filters(&self) -> &[CombinedFilter] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut [CombinedFilter] {
        &mut self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CombinedFilter> {
        self.filters.iter()
    }

    /// Narrows `extents` to every filter boundary.
    pub fn apply_filter_and_subset_boundaries_to_extents(&self, extents: &mut BoundingWorldExtent3D) {
        for filter in &self.filters {
            filter.spatial.calculate_intersection_with_extents(extents);
        }
    }

    /// Union of the filter boundaries.
    ///
    /// Returns `None` when some filter has no boundary: that filter accepts
    /// data anywhere.
    pub fn spatial_boundary_union(&self) -> Option<BoundingWorldExtent3D> {
        let mut union = BoundingWorldExtent3D::inverted();
        for filter in &self.filters {
            union.include_extent(&filter.spatial.boundary()?);
        }
        if self.filters.is_empty() {
            return None;
        }
        Some(union)
    }

    /// Identifiers of the surveyed surfaces excluded by any filter, without duplicates.
    pub fn surveyed_surface_exclusion_list(&self) -> Vec<Uuid> {
        let mut excluded: Vec<Uuid> = Vec::new();
        for filter in &self.filters {
            for id in &filter.attribute.excluded_surveyed_surfaces {
                if !excluded.contains(id) {
                    excluded.push(*id);
                }
            }
        }
        excluded
    }
}

impl<'a> IntoIterator for &'a FilterSet {
    type Item = &'a CombinedFilter;
    type IntoIter = std::slice::Iter<'a, CombinedFilter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::geometry::Fence;

    fn surface(as_at_date: time::OffsetDateTime) -> SurveyedSurface {
        SurveyedSurface::new(Uuid::new_v4(), as_at_date, BoundingWorldExtent3D::new(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn test_new_tracks_selections() {
        assert!(!CombinedFilter::default().any_filter_selections);
        let filter = CombinedFilter::new(
            SpatialFilter {
                design_mask: Some(Uuid::new_v4()),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        assert!(filter.any_filter_selections);
        assert!(!CombinedFilter::new(SpatialFilter::default(), AttributeFilter::default()).any_filter_selections);
    }

    #[test]
    fn test_prepare_rejects_reversed_time_range() {
        let mut filter = CombinedFilter::new(
            SpatialFilter::default(),
            AttributeFilter {
                time_range: Some(TimeRange::new(
                    datetime!(2024-02-01 0:00 UTC),
                    datetime!(2024-01-01 0:00 UTC),
                )),
                ..Default::default()
            },
        );
        assert_eq!(filter.prepare_for_query(), Err(RequestErrorStatus::InvalidTimeRange));
    }

    #[test]
    fn test_prepare_rejects_degenerate_fence() {
        let mut filter = CombinedFilter::new(
            SpatialFilter {
                fence: Some(Fence::from_points([(0.0, 0.0), (1.0, 1.0)])),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        assert_eq!(filter.prepare_for_query(), Err(RequestErrorStatus::InvalidSpatialFilter));

        let mut filter = CombinedFilter::new(
            SpatialFilter {
                fence: Some(Fence::rectangle(0.0, 0.0, 2.0, 2.0)),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        assert_eq!(filter.prepare_for_query(), Ok(()));
    }

    #[test]
    fn test_filter_surveyed_surfaces() {
        let early = surface(datetime!(2023-06-01 0:00 UTC));
        let inside = surface(datetime!(2024-01-15 0:00 UTC));
        let excluded = surface(datetime!(2024-01-20 0:00 UTC));
        let surfaces = vec![early.clone(), inside.clone(), excluded.clone()];

        let unfiltered = CombinedFilter::default();
        assert_eq!(unfiltered.filter_surveyed_surfaces(&surfaces).len(), 3);

        let filter = CombinedFilter::new(
            SpatialFilter::default(),
            AttributeFilter {
                time_range: Some(TimeRange::new(
                    datetime!(2024-01-01 0:00 UTC),
                    datetime!(2024-02-01 0:00 UTC),
                )),
                excluded_surveyed_surfaces: vec![excluded.id],
                ..Default::default()
            },
        );
        let kept: Vec<Uuid> = filter
            .filter_surveyed_surfaces(&surfaces)
            .into_iter()
            .map(|surface| surface.id)
            .collect();
        assert_eq!(kept, vec![inside.id]);
    }

    #[test]
    fn test_boundaries() {
        let fenced = CombinedFilter::new(
            SpatialFilter {
                fence: Some(Fence::rectangle(0.0, 0.0, 10.0, 10.0)),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        let circle = CombinedFilter::new(
            SpatialFilter {
                positional: Some(PositionalFilter {
                    x: 20.0,
                    y: 20.0,
                    radius: 5.0,
                }),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        let filters = FilterSet::base_and_top(fenced.clone(), circle);
        assert_eq!(
            filters.spatial_boundary_union(),
            Some(BoundingWorldExtent3D::new(0.0, 0.0, 25.0, 25.0))
        );
        let mut extents = BoundingWorldExtent3D::new(-100.0, -100.0, 100.0, 100.0);
        filters.apply_filter_and_subset_boundaries_to_extents(&mut extents);
        assert!(!extents.is_valid_plan_extent());

        let open = FilterSet::base_and_top(fenced, CombinedFilter::default());
        assert_eq!(open.spatial_boundary_union(), None);
        assert_eq!(FilterSet::default().spatial_boundary_union(), None);
    }

    #[test]
    fn test_surveyed_surface_exclusion_list() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let with = |ids: Vec<Uuid>| {
            CombinedFilter::new(
                SpatialFilter::default(),
                AttributeFilter {
                    excluded_surveyed_surfaces: ids,
                    ..Default::default()
                },
            )
        };
        let filters = FilterSet::base_and_top(with(vec![a, b]), with(vec![b]));
        assert_eq!(filters.surveyed_surface_exclusion_list(), vec![a, b]);
        assert!(FilterSet::unfiltered().surveyed_surface_exclusion_list().is_empty());
    }
}
