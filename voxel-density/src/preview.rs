/// Quicklook PNG rendering of metric rasters.
use crate::constants::NODATA_VALUE;
use crate::error::MetricError;
use density_grid::RATIO_EPSILON;
use image::GrayImage;
use std::path::{Path, PathBuf};

/// Write an 8-bit grayscale quicklook next to a metric raster. Nodata
/// maps to black; the metric range [0.001, 1.001] stretches over
/// 1..=255.
pub fn write_preview(
    raster_path: &Path,
    data: &[f32],
    cols: usize,
    rows: usize,
) -> Result<PathBuf, MetricError> {
    let mut pixels = Vec::with_capacity(data.len());
    for &v in data {
        if v == NODATA_VALUE {
            pixels.push(0u8);
        } else {
            let unit = (v as f64 - RATIO_EPSILON).clamp(0.0, 1.0);
            pixels.push(1 + (unit * 254.0).round() as u8);
        }
    }

    let image = GrayImage::from_raw(cols as u32, rows as u32, pixels).ok_or_else(|| {
        MetricError::InvalidArgument("quicklook buffer does not match raster dimensions".into())
    })?;
    let png_path = raster_path.with_extension("png");
    image.save(&png_path)?;
    Ok(png_path)
}
