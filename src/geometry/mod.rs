//! Geometric primitives used to test filters against sub-grids.

mod extent;
mod fence;
mod xyz;

pub use self::extent::{BoundingIntegerExtent2D, BoundingWorldExtent3D};
pub use self::fence::Fence;
pub use self::xyz::{NULL_DOUBLE, XYZ};
