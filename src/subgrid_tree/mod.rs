//! Sub-grid existence maps.
//!
//! The on-the-ground grid is split into fixed 32x32 cell sub-grids. An
//! existence map records, with one bit per sub-grid, which sub-grids hold
//! data. On-the-ground cell addresses are offset by [`INDEX_ORIGIN_OFFSET`]
//! so that negative world coordinates map to positive addresses.

mod bitmask_tree;

pub use common::{SUB_GRID_INDEX_BITS_PER_LEVEL, SUB_GRID_TREE_DIMENSION};

pub use self::bitmask_tree::{LeafRef, SubGridTreeBitMask};

/// Default on-the-ground cell size, in meters.
pub const DEFAULT_CELL_SIZE: f64 = 0.34;

/// Offset applied to on-the-ground cell addresses.
pub const INDEX_ORIGIN_OFFSET: u32 = 1 << 29;

/// Offset applied to sub-grid keys, i.e. [`INDEX_ORIGIN_OFFSET`] at sub-grid resolution.
pub const EXISTENCE_MAP_ORIGIN_OFFSET: u32 = INDEX_ORIGIN_OFFSET >> SUB_GRID_INDEX_BITS_PER_LEVEL;

/// Largest addressable sub-grid key along one axis.
pub const EXISTENCE_MAP_MAX_CELL_INDEX: u32 = (EXISTENCE_MAP_ORIGIN_OFFSET << 1) - 1;

/// Key of the sub-grid containing the on-the-ground cell `(cell_x, cell_y)`.
#[inline]
pub fn sub_grid_key_of_cell(cell_x: u32, cell_y: u32) -> (u32, u32) {
    (
        cell_x >> SUB_GRID_INDEX_BITS_PER_LEVEL,
        cell_y >> SUB_GRID_INDEX_BITS_PER_LEVEL,
    )
}

/// On-the-ground cell address containing a world position.
pub fn cell_address_of_position(x: f64, y: f64, cell_size: f64) -> Option<(u32, u32)> {
    let to_index = |ordinate: f64| {
        let index = (ordinate / cell_size).floor() + f64::from(INDEX_ORIGIN_OFFSET);
        if index.is_finite() && index >= 0.0 && index < f64::from(INDEX_ORIGIN_OFFSET) * 2.0 {
            Some(index as u32)
        } else {
            None
        }
    };
    Some((to_index(x)?, to_index(y)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingIntegerExtent2D, BoundingWorldExtent3D};

    const ORIGIN: u32 = EXISTENCE_MAP_ORIGIN_OFFSET;

    fn map_with(cells: &[(u32, u32)]) -> SubGridTreeBitMask {
        let mut map = SubGridTreeBitMask::new(1.0);
        for &(x, y) in cells {
            map.set_cell(x, y, true);
        }
        map
    }

    #[test]
    fn test_cell_addressing() {
        let (cell_x, cell_y) = cell_address_of_position(0.5, 33.0, 1.0).unwrap();
        assert_eq!((cell_x, cell_y), (INDEX_ORIGIN_OFFSET, INDEX_ORIGIN_OFFSET + 33));
        assert_eq!(sub_grid_key_of_cell(cell_x, cell_y), (ORIGIN, ORIGIN + 1));

        let map = SubGridTreeBitMask::new(1.0);
        assert_eq!(map.cell_index_of_position(0.5, 33.0), Some((ORIGIN, ORIGIN + 1)));
        assert_eq!(map.cell_index_of_position(-0.5, 0.0), Some((ORIGIN - 1, ORIGIN)));
        assert_eq!(map.cell_index_of_position(f64::NAN, 0.0), None);
        assert_eq!(map.cell_origin(ORIGIN + 1, ORIGIN), (32.0, 0.0));
        assert_eq!(map.cell_center(ORIGIN, ORIGIN), (16.0, 16.0));
        assert_eq!(
            map.cell_extent(ORIGIN, ORIGIN),
            BoundingWorldExtent3D::new(0.0, 0.0, 32.0, 32.0)
        );
    }

    #[test]
    fn test_set_get_clear() {
        let mut map = map_with(&[(ORIGIN, ORIGIN), (ORIGIN + 40, ORIGIN)]);
        assert!(map.get_cell(ORIGIN, ORIGIN));
        assert!(map.get_cell(ORIGIN + 40, ORIGIN));
        assert!(!map.get_cell(ORIGIN + 1, ORIGIN));
        assert_eq!(map.count_bits(), 2);
        map.set_cell(ORIGIN + 40, ORIGIN, false);
        assert_eq!(map.count_bits(), 1);
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_and_or() {
        let mut left = map_with(&[(0, 0), (1, 1), (100, 100)]);
        let right = map_with(&[(1, 1), (200, 200)]);
        let mut union = left.clone();
        union.or_with(&right);
        assert_eq!(union.count_bits(), 4);
        left.and_with(&right);
        assert_eq!(left.iter_set_cells().collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn test_full_cell_extent() {
        let map = map_with(&[(5, 70), (64, 3)]);
        assert_eq!(map.full_cell_extent(), BoundingIntegerExtent2D::new(5, 3, 64, 70));
        assert!(!SubGridTreeBitMask::new(1.0).full_cell_extent().is_valid_extent());
    }

    #[test]
    fn test_region_grid_coverage() {
        let map = SubGridTreeBitMask::new(1.0);
        let coverage = map.region_grid_coverage(&BoundingWorldExtent3D::new(0.0, 0.0, 31.0, 64.0));
        let origin = ORIGIN as i32;
        assert_eq!(coverage, BoundingIntegerExtent2D::new(origin, origin, origin, origin + 2));
        let everything = map.region_grid_coverage(&BoundingWorldExtent3D::maximal());
        assert_eq!(everything.min_x, 0);
        assert_eq!(everything.max_x, EXISTENCE_MAP_MAX_CELL_INDEX as i32);
    }

    #[test]
    fn test_scan_order_and_bounds() {
        let map = map_with(&[(40, 0), (0, 40), (0, 0), (100, 100)]);
        let mut origins = Vec::new();
        assert!(map.scan_all_sub_grids(|leaf| {
            origins.push(leaf.origin());
            true
        }));
        assert_eq!(origins, vec![(0, 0), (0, 32), (32, 0), (96, 96)]);
        assert_eq!(
            map.iter_set_cells().collect::<Vec<_>>(),
            vec![(0, 0), (0, 40), (40, 0), (100, 100)]
        );

        let mut origins = Vec::new();
        map.scan_sub_grids(&BoundingIntegerExtent2D::new(0, 0, 40, 20), |leaf| {
            origins.push(leaf.origin());
            true
        });
        assert_eq!(origins, vec![(0, 0), (32, 0)]);
    }

    #[test]
    fn test_scan_halts_when_visitor_returns_false() {
        let map = map_with(&[(0, 0), (40, 0), (100, 100)]);
        let mut visited = 0;
        let completed = map.scan_all_sub_grids(|_| {
            visited += 1;
            visited < 2
        });
        assert!(!completed);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_leaf_world_extent() {
        let map = map_with(&[(ORIGIN, ORIGIN)]);
        map.scan_all_sub_grids(|leaf| {
            assert_eq!(leaf.world_extent(), BoundingWorldExtent3D::new(0.0, 0.0, 1024.0, 1024.0));
            assert_eq!(leaf.key_of(1, 2), (ORIGIN + 1, ORIGIN + 2));
            assert_eq!(leaf.bits().len(), 1);
            true
        });
    }
}
