/// GeoTIFF reading and writing for voxel stacks and metric bands.
///
/// Voxel stacks are multi-page float or integer TIFFs, one page per
/// height band. Spatial placement travels in the standard GeoTIFF tags:
/// ModelPixelScale + ModelTiepoint for north-up rasters,
/// ModelTransformation when rotation terms are present, and the ASCII
/// params tag carries the projection string opaquely.
use crate::constants::NODATA_VALUE;
use crate::error::MetricError;
use crate::georef::{GeoTransform, RasterMetadata};
use density_grid::VoxelGrid;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_ASCII_PARAMS: u16 = 34737;
const TAG_GDAL_NODATA: u16 = 42113;

/// Read a multi-band voxel raster into a grid plus its spatial metadata.
/// Every page must share the first page's dimensions.
pub fn read_voxel_raster(path: &Path) -> Result<(VoxelGrid, RasterMetadata), MetricError> {
    if !path.exists() {
        return Err(MetricError::InputNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let metadata = read_geo_tags(&mut decoder);

    let (cols, rows) = decoder.dimensions()?;
    let mut data: Vec<f32> = Vec::new();
    let mut bands = 0usize;
    loop {
        let (w, h) = decoder.dimensions()?;
        if (w, h) != (cols, rows) {
            return Err(MetricError::InvalidArgument(format!(
                "band {} of {} is {}x{}, expected {}x{}",
                bands,
                path.display(),
                w,
                h,
                cols,
                rows
            )));
        }
        append_band(decoder.read_image()?, &mut data);
        bands += 1;
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let grid = VoxelGrid::new(bands, rows as usize, cols as usize, data)?;
    Ok((grid, metadata))
}

/// Read a single-band metric raster back, for clipping and previews.
pub fn read_metric_raster(
    path: &Path,
) -> Result<(Vec<f32>, usize, usize, RasterMetadata), MetricError> {
    if !path.exists() {
        return Err(MetricError::InputNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let metadata = read_geo_tags(&mut decoder);
    let (cols, rows) = decoder.dimensions()?;
    let mut data = Vec::new();
    append_band(decoder.read_image()?, &mut data);
    Ok((data, cols as usize, rows as usize, metadata))
}

/// Write a single Float32 band with geo tags and a GDAL nodata marker.
pub fn write_metric_raster(
    path: &Path,
    data: &[f32],
    cols: usize,
    rows: usize,
    metadata: &RasterMetadata,
) -> Result<(), MetricError> {
    write_gray_f32(path, &[data], cols, rows, metadata)
}

/// Multi-band voxel writer used to build test fixtures.
#[cfg(test)]
pub(crate) fn write_voxel_raster(
    path: &Path,
    grid: &VoxelGrid,
    metadata: &RasterMetadata,
) -> Result<(), MetricError> {
    let plane = grid.rows() * grid.cols();
    let bands: Vec<&[f32]> = (0..grid.bands())
        .map(|band| &grid.as_slice()[band * plane..(band + 1) * plane])
        .collect();
    write_gray_f32(path, &bands, grid.cols(), grid.rows(), metadata)
}

fn write_gray_f32(
    path: &Path,
    bands: &[&[f32]],
    cols: usize,
    rows: usize,
    metadata: &RasterMetadata,
) -> Result<(), MetricError> {
    let file = File::create(path)?;
    let mut tiff = TiffEncoder::new(BufWriter::new(file))?;

    for (idx, band) in bands.iter().enumerate() {
        let mut image = tiff.new_image::<colortype::Gray32Float>(cols as u32, rows as u32)?;
        // geo tags live on the first directory only, matching GDAL output
        if idx == 0 {
            let c = metadata.transform.coefficients();
            if metadata.transform.has_rotation() {
                let m: [f64; 16] = [
                    c[1], c[2], 0.0, c[0], c[4], c[5], 0.0, c[3], 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                    0.0, 1.0,
                ];
                image
                    .encoder()
                    .write_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION), &m[..])?;
            } else {
                let scale = [c[1], -c[5], 0.0];
                let tie = [0.0, 0.0, 0.0, c[0], c[3], 0.0];
                image
                    .encoder()
                    .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
                image
                    .encoder()
                    .write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tie[..])?;
            }
            if !metadata.projection.is_empty() {
                image
                    .encoder()
                    .write_tag(Tag::Unknown(TAG_GEO_ASCII_PARAMS), metadata.projection.as_str())?;
            }
            let nodata = format!("{}", NODATA_VALUE);
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_GDAL_NODATA), nodata.as_str())?;
        }
        image.write_data(band)?;
    }
    Ok(())
}

fn append_band(result: DecodingResult, out: &mut Vec<f32>) {
    match result {
        DecodingResult::U8(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::U16(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::U32(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::U64(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::I8(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::I16(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::I32(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::I64(v) => out.extend(v.iter().map(|&x| x as f32)),
        DecodingResult::F32(v) => out.extend_from_slice(&v),
        DecodingResult::F64(v) => out.extend(v.iter().map(|&x| x as f32)),
    }
}

fn read_geo_tags<R: Read + Seek>(decoder: &mut Decoder<R>) -> RasterMetadata {
    let projection = decoder
        .get_tag_ascii_string(Tag::Unknown(TAG_GEO_ASCII_PARAMS))
        .unwrap_or_default();

    let transform = if let Ok(m) =
        decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TRANSFORMATION))
    {
        if m.len() >= 8 {
            GeoTransform::new(m[3], m[0], m[1], m[7], m[4], m[5])
        } else {
            GeoTransform::identity()
        }
    } else {
        let scale = decoder
            .get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))
            .ok();
        let tie = decoder
            .get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT))
            .ok();
        match (scale, tie) {
            (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
                GeoTransform::new(t[3], s[0], 0.0, t[4], 0.0, -s[1])
            }
            _ => GeoTransform::identity(),
        }
    };

    RasterMetadata {
        projection,
        transform,
    }
}
