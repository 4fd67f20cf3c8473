/// GDAL virtual raster assembly over per-feature metric tiles.
use crate::constants::NODATA_VALUE;
use crate::error::MetricError;
use crate::georef::GeoTransform;
use geo::Rect;
use std::fs;
use std::path::{Path, PathBuf};

/// One written metric raster plus the placement data the mosaic needs.
pub struct MosaicPiece {
    pub path: PathBuf,
    pub cols: usize,
    pub rows: usize,
    pub transform: GeoTransform,
    pub projection: String,
}

/// Write a VRT referencing every piece as a SimpleSource. The mosaic
/// grid is anchored to the union of piece extents, or to the site
/// extent when one is supplied (keeps products aligned across metrics).
/// Pieces were all produced at the same requested pixel size; rotated
/// rasters cannot be expressed by a VRT placement and are rejected.
pub fn build_vrt(
    pieces: &[MosaicPiece],
    vrt_path: &Path,
    site_extent: Option<Rect<f64>>,
) -> Result<(), MetricError> {
    let first = pieces
        .first()
        .ok_or_else(|| MetricError::Geometry("no rasters to mosaic".to_string()))?;
    for piece in pieces {
        if piece.transform.has_rotation() {
            return Err(MetricError::Geometry(format!(
                "cannot mosaic rotated raster {}",
                piece.path.display()
            )));
        }
    }

    let px_w = first.transform.pixel_width();
    let px_h = first.transform.pixel_height();
    if px_w <= 0.0 || px_h >= 0.0 {
        return Err(MetricError::Geometry(
            "mosaic needs a north-up transform with positive pixel size".to_string(),
        ));
    }

    let (min_x, max_y, max_x, min_y) = match site_extent {
        Some(rect) => (rect.min().x, rect.max().y, rect.max().x, rect.min().y),
        None => {
            let mut min_x = f64::INFINITY;
            let mut max_x = f64::NEG_INFINITY;
            let mut min_y = f64::INFINITY;
            let mut max_y = f64::NEG_INFINITY;
            for piece in pieces {
                let ox = piece.transform.origin_x();
                let oy = piece.transform.origin_y();
                min_x = min_x.min(ox);
                max_x = max_x.max(ox + piece.cols as f64 * px_w);
                max_y = max_y.max(oy);
                min_y = min_y.min(oy + piece.rows as f64 * px_h);
            }
            (min_x, max_y, max_x, min_y)
        }
    };

    let x_size = (((max_x - min_x) / px_w).ceil()).max(1.0) as usize;
    let y_size = (((max_y - min_y) / -px_h).ceil()).max(1.0) as usize;

    let mut xml = String::new();
    xml.push_str(&format!(
        "<VRTDataset rasterXSize=\"{}\" rasterYSize=\"{}\">\n",
        x_size, y_size
    ));
    if !first.projection.is_empty() {
        xml.push_str(&format!("  <SRS>{}</SRS>\n", xml_escape(&first.projection)));
    }
    xml.push_str(&format!(
        "  <GeoTransform>{}, {}, 0.0, {}, 0.0, {}</GeoTransform>\n",
        min_x, px_w, max_y, px_h
    ));
    xml.push_str("  <VRTRasterBand dataType=\"Float32\" band=\"1\">\n");
    xml.push_str(&format!(
        "    <NoDataValue>{}</NoDataValue>\n",
        NODATA_VALUE
    ));

    for piece in pieces {
        let file_name = piece
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| piece.path.to_string_lossy().to_string());
        let x_off = ((piece.transform.origin_x() - min_x) / px_w).round() as i64;
        let y_off = ((max_y - piece.transform.origin_y()) / -px_h).round() as i64;

        xml.push_str("    <SimpleSource>\n");
        xml.push_str(&format!(
            "      <SourceFilename relativeToVRT=\"1\">{}</SourceFilename>\n",
            xml_escape(&file_name)
        ));
        xml.push_str("      <SourceBand>1</SourceBand>\n");
        xml.push_str(&format!(
            "      <SrcRect xOff=\"0\" yOff=\"0\" xSize=\"{}\" ySize=\"{}\" />\n",
            piece.cols, piece.rows
        ));
        xml.push_str(&format!(
            "      <DstRect xOff=\"{}\" yOff=\"{}\" xSize=\"{}\" ySize=\"{}\" />\n",
            x_off, y_off, piece.cols, piece.rows
        ));
        xml.push_str("    </SimpleSource>\n");
    }

    xml.push_str("  </VRTRasterBand>\n");
    xml.push_str("</VRTDataset>\n");

    fs::write(vrt_path, xml)?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
