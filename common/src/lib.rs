#![allow(clippy::len_without_is_empty)]

//! Low level containers shared by the sitegrid crates.

mod bitmask;

pub use bitmask::{
    RowSet, RowSetIterator, SubGridBitMask, SUB_GRID_INDEX_BITS_PER_LEVEL,
    SUB_GRID_LOCAL_KEY_MASK, SUB_GRID_TREE_DIMENSION,
};
