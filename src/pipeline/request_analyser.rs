//! Decides which sub-grids a request must retrieve.
//!
//! The analyser walks the overall existence map of a request, tests every
//! candidate sub-grid against the request filters and sorts the accepted
//! ones into two masks: sub-grids holding production data, and sub-grids
//! only holding surveyed surface data.

use std::mem;
use std::sync::Arc;

use common::SUB_GRID_LOCAL_KEY_MASK;
use log::{debug, trace};
use uuid::Uuid;

use crate::filter::FilterSet;
use crate::geometry::{BoundingIntegerExtent2D, BoundingWorldExtent3D};
use crate::settings::PageSettings;
use crate::subgrid_tree::{LeafRef, SubGridTreeBitMask};
use crate::SiteGridError;

/// Existence map of a design used as a filter mask.
///
/// `existence_map` is `None` when the design could not be located.
#[derive(Clone, Debug)]
pub struct DesignMask {
    pub design_id: Uuid,
    pub existence_map: Option<Arc<SubGridTreeBitMask>>,
}

/// Sub-grid counters of the last scan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AnalysisCounters {
    /// Set bits visited inside the scanned range.
    pub total_number_of_candidate_sub_grids: u64,
    /// Candidates accepted by the design overlay and every filter.
    pub total_number_of_sub_grids_analysed: u64,
    /// Analysed sub-grids on the requested page.
    pub total_number_of_sub_grids_to_request: u64,
}

struct ScanInputs<'a> {
    overall_existence_map: &'a SubGridTreeBitMask,
    production_existence_map: &'a SubGridTreeBitMask,
    design_subgrid_overlay_map: Option<&'a SubGridTreeBitMask>,
    filters: &'a FilterSet,
    world_extents: Option<BoundingWorldExtent3D>,
    submission_page: Option<PageSettings>,
    counting_requests_only: bool,
}

struct ScanState {
    counters: AnalysisCounters,
    prod_data_mask: SubGridTreeBitMask,
    surveyed_surface_only_mask: SubGridTreeBitMask,
}

pub struct RequestAnalyser {
    overall_existence_map: SubGridTreeBitMask,
    production_existence_map: Arc<SubGridTreeBitMask>,
    design_subgrid_overlay_map: Option<Arc<SubGridTreeBitMask>>,
    design_masks: Vec<DesignMask>,
    filters: Arc<FilterSet>,
    world_extents: BoundingWorldExtent3D,
    submission_page: Option<PageSettings>,
    state: ScanState,
}

impl RequestAnalyser {
    /// Creates an analyser scanning `overall_existence_map`.
    ///
    /// `production_existence_map` tells production data sub-grids apart
    /// from surveyed surface only ones. An invalid `world_extents` puts no
    /// restriction on the scan.
    pub fn new(
        overall_existence_map: SubGridTreeBitMask,
        production_existence_map: Arc<SubGridTreeBitMask>,
        filters: Arc<FilterSet>,
        world_extents: BoundingWorldExtent3D,
    ) -> RequestAnalyser {
        let cell_size = overall_existence_map.cell_size();
        RequestAnalyser {
            overall_existence_map,
            production_existence_map,
            design_subgrid_overlay_map: None,
            design_masks: Vec::new(),
            filters,
            world_extents,
            submission_page: None,
            state: ScanState {
                counters: AnalysisCounters::default(),
                prod_data_mask: SubGridTreeBitMask::new(cell_size),
                surveyed_surface_only_mask: SubGridTreeBitMask::new(cell_size),
            },
        }
    }

    /// Only sub-grids also flagged in `overlay` are requested.
    pub fn with_design_overlay(mut self, overlay: Option<Arc<SubGridTreeBitMask>>) -> RequestAnalyser {
        self.design_subgrid_overlay_map = overlay;
        self
    }

    /// Existence maps of the designs the filters use as masks.
    pub fn with_design_masks(mut self, design_masks: Vec<DesignMask>) -> RequestAnalyser {
        self.design_masks = design_masks;
        self
    }

    /// Restricts the requested sub-grids to one page.
    pub fn with_submission_page(mut self, submission_page: Option<PageSettings>) -> RequestAnalyser {
        self.submission_page = submission_page;
        self
    }

    pub fn counters(&self) -> AnalysisCounters {
        self.state.counters
    }

    pub fn total_number_of_sub_grids_to_request(&self) -> u64 {
        self.state.counters.total_number_of_sub_grids_to_request
    }

    pub fn world_extents(&self) -> BoundingWorldExtent3D {
        self.world_extents
    }

    pub fn submission_page(&self) -> Option<PageSettings> {
        self.submission_page
    }

    pub fn overall_existence_map(&self) -> &SubGridTreeBitMask {
        &self.overall_existence_map
    }

    /// Production data sub-grids to request.
    pub fn prod_data_mask(&self) -> &SubGridTreeBitMask {
        &self.state.prod_data_mask
    }

    /// Sub-grids to request for their surveyed surface data only.
    pub fn surveyed_surface_only_mask(&self) -> &SubGridTreeBitMask {
        &self.state.surveyed_surface_only_mask
    }

    /// Hands over the two masks, leaving empty ones in their place.
    pub fn take_masks(&mut self) -> (SubGridTreeBitMask, SubGridTreeBitMask) {
        let cell_size = self.overall_existence_map.cell_size();
        (
            mem::replace(&mut self.state.prod_data_mask, SubGridTreeBitMask::new(cell_size)),
            mem::replace(
                &mut self.state.surveyed_surface_only_mask,
                SubGridTreeBitMask::new(cell_size),
            ),
        )
    }

    /// Scans the existence map and fills the masks.
    ///
    /// Returns `true` if the scan ran to completion, `false` if it stopped
    /// at the end of the requested page.
    pub fn execute(&mut self) -> crate::Result<bool> {
        self.perform_scanning(false)
    }

    /// Runs the same scan as [`RequestAnalyser::execute`] without touching
    /// the masks, and returns the number of sub-grids that would be requested.
    pub fn count_of_sub_grids_that_will_be_submitted(&mut self) -> crate::Result<u64> {
        self.perform_scanning(true)?;
        Ok(self.state.counters.total_number_of_sub_grids_to_request)
    }

    fn apply_design_masks(&mut self) -> crate::Result<()> {
        for filter in self.filters.iter() {
            let Some(design_id) = filter.spatial.design_mask else {
                continue;
            };
            let mask = self
                .design_masks
                .iter()
                .find(|mask| mask.design_id == design_id)
                .and_then(|mask| mask.existence_map.as_ref())
                .ok_or(SiteGridError::DesignNotFound(design_id))?;
            self.overall_existence_map.and_with(mask);
        }
        Ok(())
    }

    fn scan_restriction(&self) -> BoundingWorldExtent3D {
        let mut restriction = if self.world_extents.is_valid_plan_extent() {
            self.world_extents
        } else {
            BoundingWorldExtent3D::maximal()
        };
        if let Some(boundary) = self.filters.spatial_boundary_union() {
            restriction.intersect(&boundary);
        }
        restriction
    }

    fn perform_scanning(&mut self, counting_requests_only: bool) -> crate::Result<bool> {
        self.apply_design_masks()?;

        let restriction = self.scan_restriction();
        let scan_extent = if restriction.is_maximal_plan_coverage() {
            self.overall_existence_map.full_cell_extent()
        } else {
            self.overall_existence_map.region_grid_coverage(&restriction)
        };
        debug!(
            "scanning {} sub-grids of the existence map over {scan_extent:?}",
            self.overall_existence_map.count_bits()
        );

        self.state.counters = AnalysisCounters::default();
        if !counting_requests_only {
            self.state.prod_data_mask.clear();
            self.state.surveyed_surface_only_mask.clear();
        }

        let world_extents = if self.world_extents.is_valid_plan_extent()
            && !self.world_extents.is_maximal_plan_coverage()
        {
            Some(self.world_extents)
        } else {
            None
        };
        let inputs = ScanInputs {
            overall_existence_map: &self.overall_existence_map,
            production_existence_map: &self.production_existence_map,
            design_subgrid_overlay_map: self.design_subgrid_overlay_map.as_deref(),
            filters: &self.filters,
            world_extents,
            submission_page: self.submission_page,
            counting_requests_only,
        };
        let state = &mut self.state;
        let completed = self
            .overall_existence_map
            .scan_sub_grids(&scan_extent, |leaf| sub_grid_event(&inputs, state, leaf));

        debug!(
            "scan {}: {:?}",
            if completed { "completed" } else { "stopped at the end of the page" },
            self.state.counters
        );
        Ok(completed)
    }
}

/// Range of leaf local bits covered by `world_extents`, expanded by one
/// on-the-ground cell.
///
/// The upper bound is exclusive in world units so that an extent ending
/// exactly on a sub-grid boundary does not pull in the next sub-grid.
fn leaf_bit_range(
    tree: &SubGridTreeBitMask,
    leaf: &LeafRef<'_>,
    world_extents: &BoundingWorldExtent3D,
) -> Option<BoundingIntegerExtent2D> {
    let mut extent = leaf.world_extent();
    extent.intersect(world_extents);
    if !extent.is_valid_plan_extent() {
        return None;
    }
    extent.expand(tree.cell_size(), tree.cell_size());

    let (origin_x, origin_y) = leaf.origin();
    let (leaf_origin_x, leaf_origin_y) = tree.cell_origin(origin_x, origin_y);
    let sub_grid_size = tree.sub_grid_world_size();
    let last = f64::from(SUB_GRID_LOCAL_KEY_MASK);
    let lower = |ordinate: f64, origin: f64| ((ordinate - origin) / sub_grid_size).floor().clamp(0.0, last) as i32;
    let upper = |ordinate: f64, origin: f64| {
        (((ordinate - origin) / sub_grid_size).ceil() - 1.0).clamp(0.0, last) as i32
    };
    Some(BoundingIntegerExtent2D::new(
        lower(extent.min_x, leaf_origin_x),
        lower(extent.min_y, leaf_origin_y),
        upper(extent.max_x, leaf_origin_x),
        upper(extent.max_y, leaf_origin_y),
    ))
}

/// Visits one leaf of the overall existence map. Returns false to stop the scan.
fn sub_grid_event(inputs: &ScanInputs<'_>, state: &mut ScanState, leaf: LeafRef<'_>) -> bool {
    let tree = inputs.overall_existence_map;
    let bit_range = match &inputs.world_extents {
        Some(world_extents) => match leaf_bit_range(tree, &leaf, world_extents) {
            Some(bit_range) => bit_range,
            None => return true,
        },
        None => BoundingIntegerExtent2D::new(0, 0, SUB_GRID_LOCAL_KEY_MASK as i32, SUB_GRID_LOCAL_KEY_MASK as i32),
    };
    trace!("leaf {:?}, local range {bit_range:?}", leaf.origin());

    let sub_grid_size = tree.sub_grid_world_size();
    let bits = leaf.bits().iter_in_range(
        bit_range.min_x as u32,
        bit_range.max_x as u32,
        bit_range.min_y as u32,
        bit_range.max_y as u32,
    );
    for (local_x, local_y) in bits {
        state.counters.total_number_of_candidate_sub_grids += 1;
        let (x, y) = leaf.key_of(local_x, local_y);

        if let Some(overlay) = inputs.design_subgrid_overlay_map {
            if !overlay.get_cell(x, y) {
                continue;
            }
        }

        let cell_extent = tree.cell_extent(x, y);
        let cell_center = tree.cell_center(x, y);
        let accepted = inputs
            .filters
            .iter()
            .all(|filter| filter.spatial.accepts_sub_grid(&cell_extent, cell_center, sub_grid_size));
        if !accepted {
            continue;
        }

        state.counters.total_number_of_sub_grids_analysed += 1;
        if let Some(page) = &inputs.submission_page {
            // A zero page size selects nothing.
            let Some(page_of_sub_grid) =
                (state.counters.total_number_of_sub_grids_analysed - 1).checked_div(page.page_size)
            else {
                return false;
            };
            if page_of_sub_grid < page.page_number {
                continue;
            }
            if page_of_sub_grid > page.page_number {
                return false;
            }
        }

        state.counters.total_number_of_sub_grids_to_request += 1;
        if inputs.counting_requests_only {
            continue;
        }
        if inputs.production_existence_map.get_cell(x, y) {
            state.prod_data_mask.set_cell(x, y, true);
        } else {
            state.surveyed_surface_only_mask.set_cell(x, y, true);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AttributeFilter, CombinedFilter, PositionalFilter, SpatialFilter};
    use crate::geometry::Fence;
    use crate::subgrid_tree::EXISTENCE_MAP_ORIGIN_OFFSET;

    const ORIGIN: u32 = EXISTENCE_MAP_ORIGIN_OFFSET;

    fn map_with(cells: &[(u32, u32)]) -> SubGridTreeBitMask {
        let mut map = SubGridTreeBitMask::new(1.0);
        for &(x, y) in cells {
            map.set_cell(ORIGIN + x, ORIGIN + y, true);
        }
        map
    }

    fn analyser(
        overall: &[(u32, u32)],
        production: &[(u32, u32)],
        filters: FilterSet,
        world_extents: BoundingWorldExtent3D,
    ) -> RequestAnalyser {
        RequestAnalyser::new(
            map_with(overall),
            Arc::new(map_with(production)),
            Arc::new(filters),
            world_extents,
        )
    }

    fn keys(map: &SubGridTreeBitMask) -> Vec<(u32, u32)> {
        map.iter_set_cells().map(|(x, y)| (x - ORIGIN, y - ORIGIN)).collect()
    }

    #[test]
    fn test_extent_ending_on_a_sub_grid_boundary() {
        let mut analyser = analyser(
            &[(0, 0), (1, 0)],
            &[(0, 0), (1, 0)],
            FilterSet::unfiltered(),
            BoundingWorldExtent3D::new(0.0, 0.0, 31.0, 31.0),
        );
        assert!(analyser.execute().unwrap());
        assert_eq!(analyser.total_number_of_sub_grids_to_request(), 1);
        assert_eq!(keys(analyser.prod_data_mask()), vec![(0, 0)]);
    }

    #[test]
    fn test_one_cell_expansion_reaches_the_neighbour() {
        let mut analyser = analyser(
            &[(0, 0), (1, 0)],
            &[],
            FilterSet::unfiltered(),
            BoundingWorldExtent3D::new(0.0, 0.0, 31.5, 31.0),
        );
        analyser.execute().unwrap();
        assert_eq!(analyser.total_number_of_sub_grids_to_request(), 2);
        assert_eq!(keys(analyser.surveyed_surface_only_mask()), vec![(0, 0), (1, 0)]);
        assert!(analyser.prod_data_mask().is_empty());
    }

    #[test]
    fn test_partitions_production_and_surveyed_surface_only() {
        let mut analyser = analyser(
            &[(0, 0), (0, 1), (5, 5), (40, 2)],
            &[(0, 1), (40, 2)],
            FilterSet::unfiltered(),
            BoundingWorldExtent3D::inverted(),
        );
        analyser.execute().unwrap();
        assert_eq!(
            analyser.counters(),
            AnalysisCounters {
                total_number_of_candidate_sub_grids: 4,
                total_number_of_sub_grids_analysed: 4,
                total_number_of_sub_grids_to_request: 4,
            }
        );
        assert_eq!(keys(analyser.prod_data_mask()), vec![(0, 1), (40, 2)]);
        assert_eq!(keys(analyser.surveyed_surface_only_mask()), vec![(0, 0), (5, 5)]);
    }

    #[test]
    fn test_fence_filter_rejects_sub_grids() {
        let filter = CombinedFilter::new(
            SpatialFilter {
                fence: Some(Fence::rectangle(0.0, 0.0, 40.0, 40.0)),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        let mut analyser = analyser(
            &[(0, 0), (1, 1), (3, 3)],
            &[(0, 0), (1, 1), (3, 3)],
            FilterSet::single(filter),
            BoundingWorldExtent3D::inverted(),
        );
        analyser.execute().unwrap();
        assert_eq!(keys(analyser.prod_data_mask()), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_positional_filter() {
        let filter = CombinedFilter::new(
            SpatialFilter {
                positional: Some(PositionalFilter {
                    x: 16.0,
                    y: 16.0,
                    radius: 20.0,
                }),
                ..Default::default()
            },
            AttributeFilter::default(),
        );
        let mut analyser = analyser(
            &[(0, 0), (1, 0), (2, 0)],
            &[],
            FilterSet::single(filter),
            BoundingWorldExtent3D::inverted(),
        );
        analyser.execute().unwrap();
        // (1, 0) is centered 32 away: within 20 + 16 * sqrt(2)
        assert_eq!(keys(analyser.surveyed_surface_only_mask()), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_design_overlay_skips_candidates() {
        let mut analyser = analyser(&[(0, 0), (1, 0)], &[], FilterSet::unfiltered(), BoundingWorldExtent3D::inverted())
            .with_design_overlay(Some(Arc::new(map_with(&[(1, 0)]))));
        analyser.execute().unwrap();
        let counters = analyser.counters();
        assert_eq!(counters.total_number_of_candidate_sub_grids, 2);
        assert_eq!(counters.total_number_of_sub_grids_analysed, 1);
        assert_eq!(keys(analyser.surveyed_surface_only_mask()), vec![(1, 0)]);
    }

    #[test]
    fn test_design_masks() {
        let design_id = Uuid::new_v4();
        let filters = FilterSet::single(CombinedFilter::new(
            SpatialFilter {
                design_mask: Some(design_id),
                ..Default::default()
            },
            AttributeFilter::default(),
        ));

        let mut missing = analyser(&[(0, 0)], &[], filters.clone(), BoundingWorldExtent3D::inverted());
        assert!(matches!(missing.execute(), Err(SiteGridError::DesignNotFound(id)) if id == design_id));

        let mut masked = analyser(&[(0, 0), (2, 2)], &[], filters, BoundingWorldExtent3D::inverted())
            .with_design_masks(vec![DesignMask {
                design_id,
                existence_map: Some(Arc::new(map_with(&[(2, 2), (3, 3)]))),
            }]);
        masked.execute().unwrap();
        assert_eq!(keys(masked.overall_existence_map()), vec![(2, 2)]);
        assert_eq!(masked.total_number_of_sub_grids_to_request(), 1);
    }

    #[test]
    fn test_pagination_stops_the_scan() {
        let cells: Vec<(u32, u32)> = (0..10).map(|i| (i * 3, 0)).collect();
        let page = |page_number| {
            let mut analyser = analyser(&cells, &cells, FilterSet::unfiltered(), BoundingWorldExtent3D::inverted())
                .with_submission_page(Some(PageSettings {
                    page_size: 4,
                    page_number,
                }));
            let completed = analyser.execute().unwrap();
            (completed, keys(analyser.prod_data_mask()), analyser.counters())
        };

        let (completed, first, counters) = page(0);
        assert!(!completed);
        assert_eq!(first, vec![(0, 0), (3, 0), (6, 0), (9, 0)]);
        assert_eq!(counters.total_number_of_sub_grids_analysed, 5);

        let (completed, last, counters) = page(2);
        assert!(completed);
        assert_eq!(last, vec![(24, 0), (27, 0)]);
        assert_eq!(counters.total_number_of_sub_grids_to_request, 2);

        let (_, beyond, _) = page(3);
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_zero_page_size_requests_nothing() {
        let cells = [(0, 0), (1, 0), (2, 0)];
        let mut analyser = analyser(&cells, &cells, FilterSet::unfiltered(), BoundingWorldExtent3D::inverted())
            .with_submission_page(Some(PageSettings {
                page_size: 0,
                page_number: 0,
            }));
        assert!(!analyser.execute().unwrap());
        assert_eq!(analyser.total_number_of_sub_grids_to_request(), 0);
        assert!(analyser.prod_data_mask().is_empty());
    }

    #[test]
    fn test_counting_does_not_touch_the_masks() {
        let mut analyser = analyser(&[(0, 0), (1, 1), (2, 2)], &[(1, 1)], FilterSet::unfiltered(), BoundingWorldExtent3D::inverted());
        assert_eq!(analyser.count_of_sub_grids_that_will_be_submitted().unwrap(), 3);
        assert!(analyser.prod_data_mask().is_empty());
        assert!(analyser.surveyed_surface_only_mask().is_empty());
        analyser.execute().unwrap();
        let (prod_data_mask, surveyed_surface_only_mask) = analyser.take_masks();
        assert_eq!(prod_data_mask.count_bits(), 1);
        assert_eq!(surveyed_surface_only_mask.count_bits(), 2);
        assert!(analyser.prod_data_mask().is_empty());
    }
}
