//! Voxel aggregation and relative-density kernel.
//!
//! A [`VoxelGrid`] holds per-height-layer return counts at native voxel
//! resolution. [`VoxelGrid::aggregate`] re-bins it to a coarser spatial
//! resolution, and [`relative_density`] collapses the band axis into a
//! single transformed ratio raster. Both operations are pure and keep a
//! fixed summation order, so identical inputs always produce bit-identical
//! outputs. No geospatial types live here; raster metadata is the caller's
//! concern.

mod density;
mod error;
mod grid;

pub use density::{DensityRaster, RATIO_EPSILON, relative_density};
pub use error::KernelError;
pub use grid::VoxelGrid;
