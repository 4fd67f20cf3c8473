/// In-place clipping of written metric rasters to site feature geometry.
use crate::constants::NODATA_VALUE;
use crate::error::MetricError;
use crate::georef::GeoTransform;
use crate::raster_io::{read_metric_raster, write_metric_raster};
use crate::site::SiteFeature;
use geo::{BoundingRect, Contains, Point};
use std::path::Path;

/// Pixel window and shifted transform of a raster after clipping.
pub struct ClipResult {
    pub cols: usize,
    pub rows: usize,
    pub transform: GeoTransform,
}

/// Crop the raster at `path` to the feature's bounding rectangle and
/// mask every pixel whose center falls outside the geometry to nodata,
/// rewriting the file in place with the shifted origin.
pub fn clip_to_feature(path: &Path, feature: &SiteFeature) -> Result<ClipResult, MetricError> {
    let (data, cols, rows, mut metadata) = read_metric_raster(path)?;

    let rect = feature.geometry.bounding_rect().ok_or_else(|| {
        MetricError::Geometry(format!("feature '{}' has an empty geometry", feature.token))
    })?;

    // pixel window covering the feature bounds, clamped to the raster
    let corners = [
        (rect.min().x, rect.min().y),
        (rect.min().x, rect.max().y),
        (rect.max().x, rect.min().y),
        (rect.max().x, rect.max().y),
    ];
    let mut min_col = f64::INFINITY;
    let mut min_row = f64::INFINITY;
    let mut max_col = f64::NEG_INFINITY;
    let mut max_row = f64::NEG_INFINITY;
    for (x, y) in corners {
        let (col, row) = metadata
            .transform
            .world_to_pixel(x, y)
            .ok_or_else(|| MetricError::Geometry("raster transform is not invertible".into()))?;
        min_col = min_col.min(col);
        max_col = max_col.max(col);
        min_row = min_row.min(row);
        max_row = max_row.max(row);
    }
    let col0 = min_col.floor().max(0.0) as usize;
    let row0 = min_row.floor().max(0.0) as usize;
    let col1 = (max_col.ceil().max(0.0) as usize).min(cols);
    let row1 = (max_row.ceil().max(0.0) as usize).min(rows);
    if col0 >= col1 || row0 >= row1 {
        return Err(MetricError::Geometry(format!(
            "feature '{}' does not intersect the raster",
            feature.token
        )));
    }

    let out_cols = col1 - col0;
    let out_rows = row1 - row0;
    let mut out = vec![NODATA_VALUE; out_cols * out_rows];
    for row in row0..row1 {
        for col in col0..col1 {
            let (x, y) = metadata.transform.pixel_center_to_world(col, row);
            if feature.geometry.contains(&Point::new(x, y)) {
                out[(row - row0) * out_cols + (col - col0)] = data[row * cols + col];
            }
        }
    }

    let transform = metadata.transform.translated_to(col0, row0);
    metadata.transform = transform;
    write_metric_raster(path, &out, out_cols, out_rows, &metadata)?;

    Ok(ClipResult {
        cols: out_cols,
        rows: out_rows,
        transform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::georef::RasterMetadata;
    use geo::{Geometry, LineString, Polygon};
    use tempfile::tempdir;

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (min_x, min_y),
                (max_x, min_y),
                (max_x, max_y),
                (min_x, max_y),
                (min_x, min_y),
            ]),
            vec![],
        ))
    }

    /// 4x4 raster, pixel size 1, covering world x 0..4 and y 0..4.
    fn write_sample(path: &Path) -> Vec<f32> {
        let data: Vec<f32> = (0..16).map(|i| i as f32 + 1.0).collect();
        let metadata = RasterMetadata {
            projection: String::new(),
            transform: GeoTransform::new(0.0, 1.0, 0.0, 4.0, 0.0, -1.0),
        };
        write_metric_raster(path, &data, 4, 4, &metadata).unwrap();
        data
    }

    #[test]
    fn test_crop_shifts_origin_and_keeps_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metric.tif");
        let data = write_sample(&path);

        let feature = SiteFeature {
            token: "a".to_string(),
            // covers pixel cols 1..3, rows 1..3
            geometry: square(1.0, 1.0, 3.0, 3.0),
        };
        let result = clip_to_feature(&path, &feature).unwrap();
        assert_eq!((result.cols, result.rows), (2, 2));
        assert_eq!(result.transform.origin_x(), 1.0);
        assert_eq!(result.transform.origin_y(), 3.0);

        let (clipped, cols, rows, metadata) = read_metric_raster(&path).unwrap();
        assert_eq!((cols, rows), (2, 2));
        assert_eq!(metadata.transform, result.transform);
        // window rows 1..3 and cols 1..3 of the source raster
        assert_eq!(clipped, vec![data[5], data[6], data[9], data[10]]);
    }

    #[test]
    fn test_cells_outside_geometry_become_nodata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metric.tif");
        write_sample(&path);

        // triangle covering the lower-left half of the raster
        let feature = SiteFeature {
            token: "tri".to_string(),
            geometry: Geometry::Polygon(Polygon::new(
                LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (0.0, 0.0)]),
                vec![],
            )),
        };
        clip_to_feature(&path, &feature).unwrap();

        let (clipped, cols, rows, _) = read_metric_raster(&path).unwrap();
        assert_eq!((cols, rows), (4, 4));
        // top-right corner center (3.5, 3.5) is outside the triangle
        assert_eq!(clipped[3], NODATA_VALUE);
        // bottom-left corner center (0.5, 0.5) is inside
        assert_ne!(clipped[12], NODATA_VALUE);
    }

    #[test]
    fn test_disjoint_feature_is_geometry_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metric.tif");
        write_sample(&path);

        let feature = SiteFeature {
            token: "far".to_string(),
            geometry: square(100.0, 100.0, 101.0, 101.0),
        };
        assert!(matches!(
            clip_to_feature(&path, &feature),
            Err(MetricError::Geometry(_))
        ));
    }
}
