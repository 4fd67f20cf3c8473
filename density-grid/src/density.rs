//! Relative-density ratio computation and variance-stabilizing transform.

use crate::error::KernelError;
use crate::grid::VoxelGrid;

/// Offset added after the square root so cells with return data never
/// collapse to exactly zero in the output raster.
pub const RATIO_EPSILON: f64 = 0.001;

/// 2D result raster, row-major, same row/col shape as the aggregated
/// grid it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityRaster {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DensityRaster {
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `[row, col]`
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Flat row-major buffer
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Collapse the band axis into a transformed relative-density raster.
///
/// For every cell column the region-of-interest mass is the sum of bands
/// `start + 1 ..= stop` (the `+ 1` excludes the ground layer at `start`)
/// and the total mass is the sum over all bands. The output cell is
/// `sqrt(roi / total) + 0.001`, with the ratio defined as 0 where the
/// column holds no returns at all, so the result is finite everywhere.
///
/// Band indices past the top of the grid are clamped; an interval that
/// lies entirely above the grid legitimately produces a uniform `0.001`
/// raster. `stop < start` is an error. Accumulation is f64 in strictly
/// increasing band order, which makes repeat runs bit-identical.
pub fn relative_density(
    grid: &VoxelGrid,
    start: usize,
    stop: usize,
) -> Result<DensityRaster, KernelError> {
    if stop < start {
        return Err(KernelError::InvalidArgument(format!(
            "region of interest is inverted: start {} > stop {}",
            start, stop
        )));
    }

    let bands = grid.bands();
    let rows = grid.rows();
    let cols = grid.cols();

    // half-open ROI band range after the ground-exclusion shift
    let roi_lo = (start + 1).min(bands);
    let roi_hi = (stop + 1).min(bands);

    let mut data = vec![0.0f32; rows * cols];
    for row in 0..rows {
        for col in 0..cols {
            let mut roi_mass = 0.0f64;
            let mut total_mass = 0.0f64;
            for band in 0..bands {
                let v = grid.value(band, row, col) as f64;
                total_mass += v;
                if band >= roi_lo && band < roi_hi {
                    roi_mass += v;
                }
            }
            let ratio = if total_mass > 0.0 {
                roi_mass / total_mass
            } else {
                0.0
            };
            data[row * cols + col] = (ratio.sqrt() + RATIO_EPSILON) as f32;
        }
    }

    Ok(DensityRaster { rows, cols, data })
}
