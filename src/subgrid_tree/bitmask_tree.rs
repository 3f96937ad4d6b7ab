use std::collections::BTreeMap;
use std::fmt;

use common::{SubGridBitMask, SUB_GRID_INDEX_BITS_PER_LEVEL, SUB_GRID_LOCAL_KEY_MASK, SUB_GRID_TREE_DIMENSION};

use super::{EXISTENCE_MAP_ORIGIN_OFFSET, EXISTENCE_MAP_MAX_CELL_INDEX};
use crate::geometry::{BoundingIntegerExtent2D, BoundingWorldExtent3D};

/// Hierarchical existence map: one bit per on-the-ground sub-grid.
///
/// Bits are addressed by sub-grid key, i.e. the on-the-ground cell address
/// shifted right by [`SUB_GRID_INDEX_BITS_PER_LEVEL`]. Keys are grouped in
/// 32x32 leaves; only leaves holding at least one set bit are stored.
///
/// `cell_size` is the on-the-ground cell size. A bit of this map covers
/// `cell_size * 32` world units along each axis.
#[derive(Clone, PartialEq)]
pub struct SubGridTreeBitMask {
    cell_size: f64,
    leaves: BTreeMap<(u32, u32), SubGridBitMask>,
}

impl fmt::Debug for SubGridTreeBitMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubGridTreeBitMask")
            .field("cell_size", &self.cell_size)
            .field("num_leaves", &self.leaves.len())
            .field("count_bits", &self.count_bits())
            .finish()
    }
}

/// A leaf of a [`SubGridTreeBitMask`] handed to scan visitors.
#[derive(Clone, Copy)]
pub struct LeafRef<'a> {
    origin_x: u32,
    origin_y: u32,
    bits: &'a SubGridBitMask,
    tree: &'a SubGridTreeBitMask,
}

impl<'a> LeafRef<'a> {
    /// Key of the sub-grid flagged by bit `(0, 0)` of this leaf.
    pub fn origin(&self) -> (u32, u32) {
        (self.origin_x, self.origin_y)
    }

    pub fn bits(&self) -> &'a SubGridBitMask {
        self.bits
    }

    /// Returns the key of the sub-grid flagged by the leaf local bit `(x, y)`.
    pub fn key_of(&self, x: u32, y: u32) -> (u32, u32) {
        (self.origin_x + x, self.origin_y + y)
    }

    /// World extent covered by the 32x32 sub-grids of this leaf.
    pub fn world_extent(&self) -> BoundingWorldExtent3D {
        let mut extent = self.tree.cell_extent(self.origin_x, self.origin_y);
        let span = self.tree.sub_grid_world_size() * f64::from(SUB_GRID_TREE_DIMENSION - 1);
        extent.max_x += span;
        extent.max_y += span;
        extent
    }
}

impl SubGridTreeBitMask {
    /// Creates an empty map for on-the-ground cells of `cell_size` world units.
    pub fn new(cell_size: f64) -> SubGridTreeBitMask {
        SubGridTreeBitMask {
            cell_size,
            leaves: BTreeMap::new(),
        }
    }

    /// On-the-ground cell size.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// World size of one sub-grid, i.e. of one bit of this map.
    pub fn sub_grid_world_size(&self) -> f64 {
        self.cell_size * f64::from(SUB_GRID_TREE_DIMENSION)
    }

    fn leaf_key(x: u32, y: u32) -> (u32, u32) {
        (
            x >> SUB_GRID_INDEX_BITS_PER_LEVEL,
            y >> SUB_GRID_INDEX_BITS_PER_LEVEL,
        )
    }

    pub fn get_cell(&self, x: u32, y: u32) -> bool {
        self.leaves
            .get(&Self::leaf_key(x, y))
            .map(|leaf| leaf.contains(x & SUB_GRID_LOCAL_KEY_MASK, y & SUB_GRID_LOCAL_KEY_MASK))
            .unwrap_or(false)
    }

    pub fn set_cell(&mut self, x: u32, y: u32, value: bool) {
        let key = Self::leaf_key(x, y);
        let (local_x, local_y) = (x & SUB_GRID_LOCAL_KEY_MASK, y & SUB_GRID_LOCAL_KEY_MASK);
        if value {
            self.leaves.entry(key).or_default().insert(local_x, local_y);
        } else if let Some(leaf) = self.leaves.get_mut(&key) {
            leaf.remove(local_x, local_y);
            if leaf.is_empty() {
                self.leaves.remove(&key);
            }
        }
    }

    pub fn clear(&mut self) {
        self.leaves.clear();
    }

    /// Number of bits set.
    pub fn count_bits(&self) -> u64 {
        self.leaves.values().map(|leaf| u64::from(leaf.len())).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// In-place intersection: keeps only the bits also set in `other`.
    pub fn and_with(&mut self, other: &SubGridTreeBitMask) {
        self.leaves.retain(|key, leaf| match other.leaves.get(key) {
            Some(other_leaf) => {
                leaf.intersect_update(other_leaf);
                !leaf.is_empty()
            }
            None => false,
        });
    }

    /// In-place union: adds every bit set in `other`.
    pub fn or_with(&mut self, other: &SubGridTreeBitMask) {
        for (key, other_leaf) in &other.leaves {
            self.leaves
                .entry(*key)
                .and_modify(|leaf| leaf.union_update(other_leaf))
                .or_insert_with(|| other_leaf.clone());
        }
    }

    /// Smallest extent, in sub-grid keys, holding every set bit.
    pub fn full_cell_extent(&self) -> BoundingIntegerExtent2D {
        let mut extent = BoundingIntegerExtent2D::inverted();
        for (x, y) in self.iter_set_cells() {
            extent.include(x as i32, y as i32);
        }
        extent
    }

    /// World coordinates of the lower left corner of the sub-grid `(x, y)`.
    pub fn cell_origin(&self, x: u32, y: u32) -> (f64, f64) {
        let size = self.sub_grid_world_size();
        (
            (i64::from(x) - i64::from(EXISTENCE_MAP_ORIGIN_OFFSET)) as f64 * size,
            (i64::from(y) - i64::from(EXISTENCE_MAP_ORIGIN_OFFSET)) as f64 * size,
        )
    }

    pub fn cell_center(&self, x: u32, y: u32) -> (f64, f64) {
        let (origin_x, origin_y) = self.cell_origin(x, y);
        let half = self.sub_grid_world_size() / 2.0;
        (origin_x + half, origin_y + half)
    }

    /// World extent of the sub-grid `(x, y)`.
    pub fn cell_extent(&self, x: u32, y: u32) -> BoundingWorldExtent3D {
        let (origin_x, origin_y) = self.cell_origin(x, y);
        let size = self.sub_grid_world_size();
        BoundingWorldExtent3D::new(origin_x, origin_y, origin_x + size, origin_y + size)
    }

    /// Key of the sub-grid containing the world position, if addressable.
    pub fn cell_index_of_position(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        Some((self.index_of_ordinate(x)?, self.index_of_ordinate(y)?))
    }

    fn index_of_ordinate(&self, ordinate: f64) -> Option<u32> {
        let index = (ordinate / self.sub_grid_world_size()).floor() + f64::from(EXISTENCE_MAP_ORIGIN_OFFSET);
        if index.is_finite() && index >= 0.0 && index <= f64::from(EXISTENCE_MAP_MAX_CELL_INDEX) {
            Some(index as u32)
        } else {
            None
        }
    }

    fn clamped_index_of_ordinate(&self, ordinate: f64) -> i32 {
        let index = (ordinate / self.sub_grid_world_size()).floor() + f64::from(EXISTENCE_MAP_ORIGIN_OFFSET);
        if index.is_nan() {
            return 0;
        }
        index.clamp(0.0, f64::from(EXISTENCE_MAP_MAX_CELL_INDEX)) as i32
    }

    /// Range of sub-grid keys touched by a world extent, clamped to the addressable range.
    pub fn region_grid_coverage(&self, extent: &BoundingWorldExtent3D) -> BoundingIntegerExtent2D {
        if !extent.is_valid_plan_extent() {
            return BoundingIntegerExtent2D::inverted();
        }
        BoundingIntegerExtent2D::new(
            self.clamped_index_of_ordinate(extent.min_x),
            self.clamped_index_of_ordinate(extent.min_y),
            self.clamped_index_of_ordinate(extent.max_x),
            self.clamped_index_of_ordinate(extent.max_y),
        )
    }

    /// Visits, in scan order, every leaf holding set bits whose key range
    /// intersects `extent`.
    ///
    /// Scanning stops as soon as `visitor` returns false. Returns false if
    /// the scan was halted that way, true if it ran to completion.
    pub fn scan_sub_grids<F>(&self, extent: &BoundingIntegerExtent2D, mut visitor: F) -> bool
    where F: FnMut(LeafRef<'_>) -> bool {
        if !extent.is_valid_extent() || extent.max_x < 0 || extent.max_y < 0 {
            return true;
        }
        let leaf_min_x = (extent.min_x.max(0) as u32) >> SUB_GRID_INDEX_BITS_PER_LEVEL;
        let leaf_max_x = (extent.max_x as u32) >> SUB_GRID_INDEX_BITS_PER_LEVEL;
        let leaf_min_y = (extent.min_y.max(0) as u32) >> SUB_GRID_INDEX_BITS_PER_LEVEL;
        let leaf_max_y = (extent.max_y as u32) >> SUB_GRID_INDEX_BITS_PER_LEVEL;
        let candidate_leaves = self
            .leaves
            .range((leaf_min_x, 0)..=(leaf_max_x, u32::MAX))
            .filter(|((_, leaf_y), _)| (leaf_min_y..=leaf_max_y).contains(leaf_y));
        for (&(leaf_x, leaf_y), bits) in candidate_leaves {
            let leaf = LeafRef {
                origin_x: leaf_x << SUB_GRID_INDEX_BITS_PER_LEVEL,
                origin_y: leaf_y << SUB_GRID_INDEX_BITS_PER_LEVEL,
                bits,
                tree: self,
            };
            if !visitor(leaf) {
                return false;
            }
        }
        true
    }

    /// Visits every leaf. See [`SubGridTreeBitMask::scan_sub_grids`].
    pub fn scan_all_sub_grids<F>(&self, visitor: F) -> bool
    where F: FnMut(LeafRef<'_>) -> bool {
        self.scan_sub_grids(&BoundingIntegerExtent2D::maximal(), visitor)
    }

    /// Iterates over the keys of the set bits in scan order.
    pub fn iter_set_cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.leaves.iter().flat_map(|(&(leaf_x, leaf_y), bits)| {
            let origin_x = leaf_x << SUB_GRID_INDEX_BITS_PER_LEVEL;
            let origin_y = leaf_y << SUB_GRID_INDEX_BITS_PER_LEVEL;
            bits.iter().map(move |(x, y)| (origin_x + x, origin_y + y))
        })
    }
}
