mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::pipeline_helpers::*;
use proptest::collection::btree_map;
use proptest::prelude::*;
use sitegrid::filter::FilterSet;
use sitegrid::geometry::BoundingWorldExtent3D;
use sitegrid::pipeline::RequestAnalyser;
use sitegrid::settings::PageSettings;
use sitegrid::subgrid_tree::SubGridTreeBitMask;

/// Sub-grids spread over four leaves, flagged `true` when they hold production data.
fn sub_grids() -> impl Strategy<Value = BTreeMap<(u32, u32), bool>> {
    btree_map((0u32..40, 0u32..40), any::<bool>(), 0..120)
}

fn world_extents() -> impl Strategy<Value = BoundingWorldExtent3D> {
    (0.0f64..1200.0, 0.0f64..1200.0, 1.0f64..400.0, 1.0f64..400.0)
        .prop_map(|(min_x, min_y, size_x, size_y)| {
            BoundingWorldExtent3D::new(min_x, min_y, min_x + size_x, min_y + size_y)
        })
}

fn analyser(sub_grids: &BTreeMap<(u32, u32), bool>, world_extents: BoundingWorldExtent3D) -> RequestAnalyser {
    let overall: Vec<(u32, u32)> = sub_grids.keys().copied().collect();
    let production: Vec<(u32, u32)> = sub_grids
        .iter()
        .filter(|(_, &is_production)| is_production)
        .map(|(&key, _)| key)
        .collect();
    RequestAnalyser::new(
        existence_map(&overall),
        Arc::new(existence_map(&production)),
        Arc::new(FilterSet::unfiltered()),
        world_extents,
    )
}

fn union(masks: (SubGridTreeBitMask, SubGridTreeBitMask)) -> BTreeSet<(u32, u32)> {
    offsets(&masks.0).into_iter().chain(offsets(&masks.1)).collect()
}

fn sub_grid_extent(x: u32, y: u32) -> BoundingWorldExtent3D {
    let (x, y) = (f64::from(x) * 32.0, f64::from(y) * 32.0);
    BoundingWorldExtent3D::new(x, y, x + 32.0, y + 32.0)
}

proptest! {
    #[test]
    fn test_pages_concatenate_to_the_unrestricted_scan(sub_grids in sub_grids(), page_size in 1u64..20) {
        let mut whole = analyser(&sub_grids, BoundingWorldExtent3D::inverted());
        prop_assert!(whole.execute().unwrap());
        let (whole_prod, whole_surveyed) = whole.take_masks();
        prop_assert_eq!(whole.total_number_of_sub_grids_to_request(), sub_grids.len() as u64);

        let mut prod = Vec::new();
        let mut surveyed = Vec::new();
        let num_pages = sub_grids.len() as u64 / page_size + 1;
        for page_number in 0..num_pages {
            let mut page = analyser(&sub_grids, BoundingWorldExtent3D::inverted())
                .with_submission_page(Some(PageSettings { page_size, page_number }));
            let completed = page.execute().unwrap();
            let num_requested = page.total_number_of_sub_grids_to_request();
            prop_assert!(num_requested <= page_size);
            if !completed {
                prop_assert_eq!(num_requested, page_size);
            }
            let (page_prod, page_surveyed) = page.take_masks();
            prod.extend(offsets(&page_prod));
            surveyed.extend(offsets(&page_surveyed));
        }
        prop_assert_eq!(prod, offsets(&whole_prod));
        prop_assert_eq!(surveyed, offsets(&whole_surveyed));
    }

    #[test]
    fn test_masks_partition_the_sub_grids_within_the_extents(
        sub_grids in sub_grids(),
        world_extents in world_extents(),
    ) {
        let mut analyser = analyser(&sub_grids, world_extents);
        let num_to_submit = analyser.count_of_sub_grids_that_will_be_submitted().unwrap();
        prop_assert!(analyser.prod_data_mask().is_empty());
        prop_assert!(analyser.surveyed_surface_only_mask().is_empty());

        prop_assert!(analyser.execute().unwrap());
        let (prod, surveyed) = analyser.take_masks();
        for key in offsets(&prod) {
            prop_assert_eq!(sub_grids.get(&key), Some(&true));
        }
        for key in offsets(&surveyed) {
            prop_assert_eq!(sub_grids.get(&key), Some(&false));
        }
        let selected = union((prod, surveyed));
        prop_assert_eq!(selected.len() as u64, num_to_submit);

        let mut expanded = world_extents;
        expanded.expand(1.0, 1.0);
        for &(x, y) in sub_grids.keys() {
            let extent = sub_grid_extent(x, y);
            let overlaps_interior = extent.min_x < world_extents.max_x
                && extent.max_x > world_extents.min_x
                && extent.min_y < world_extents.max_y
                && extent.max_y > world_extents.min_y;
            if overlaps_interior {
                prop_assert!(selected.contains(&(x, y)), "{:?} missing", (x, y));
            }
            if selected.contains(&(x, y)) {
                prop_assert!(extent.intersects(&expanded), "{:?} too far", (x, y));
            }
        }
    }
}
