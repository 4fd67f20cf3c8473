/// Command line surface and the validated run configuration built from it.
use crate::constants::{METRIC_SUFFIX, metric_file_name, voxel_file_name};
use crate::error::MetricError;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "voxel-density")]
#[command(about = "Process voxel lidar rasters into relative density metric rasters")]
pub struct Cli {
    /// Directory holding voxel lidar rasters
    pub voxdir: PathBuf,

    /// Return-data types to use for calculations; the first tag selects
    /// the input file name
    #[arg(long, num_args = 1.., default_value = "count")]
    pub voxtype: Vec<String>,

    /// Metric name used for naming output images, defaults to
    /// rdm-<start>_to_<stop>
    #[arg(long)]
    pub metric: Option<String>,

    /// Low height of the relative density region of interest
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub start: i64,

    /// Top height of the relative density region of interest
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub stop: i64,

    /// Output image pixel size, used to aggregate voxels in x-y
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub pixelsize: i64,

    /// Site vector (GeoJSON polygons) used for per-feature naming and
    /// clipping
    #[arg(short, long)]
    pub site: Option<PathBuf>,

    /// Directory to output metric rasters
    #[arg(long)]
    pub outdir: PathBuf,

    /// Overwrite any existing output files
    #[arg(short, long)]
    pub overwrite: bool,

    /// Print additional info
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write an 8-bit PNG quicklook next to each metric raster
    #[arg(long)]
    pub preview: bool,
}

/// Immutable run configuration, validated once at startup.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub voxdir: PathBuf,
    pub voxtype: Vec<String>,
    pub product: String,
    pub start: usize,
    pub stop: usize,
    pub pixelsize: usize,
    pub site: Option<PathBuf>,
    pub outdir: PathBuf,
    pub overwrite: bool,
    pub verbose: bool,
    pub preview: bool,
}

impl ProcessingConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, MetricError> {
        if cli.start < 0 || cli.stop < 0 {
            return Err(MetricError::InvalidArgument(format!(
                "region of interest bounds must be non-negative, got start {} stop {}",
                cli.start, cli.stop
            )));
        }
        if cli.stop < cli.start {
            return Err(MetricError::InvalidArgument(format!(
                "region of interest is inverted: start {} > stop {}",
                cli.start, cli.stop
            )));
        }
        if cli.pixelsize < 1 {
            return Err(MetricError::InvalidArgument(format!(
                "pixelsize must be a positive integer, got {}",
                cli.pixelsize
            )));
        }

        let product = cli
            .metric
            .clone()
            .unwrap_or_else(|| format!("rdm-{}_to_{}", cli.start, cli.stop));

        Ok(Self {
            voxdir: cli.voxdir.clone(),
            voxtype: cli.voxtype.clone(),
            product,
            start: cli.start as usize,
            stop: cli.stop as usize,
            pixelsize: cli.pixelsize as usize,
            site: cli.site.clone(),
            outdir: cli.outdir.clone(),
            overwrite: cli.overwrite,
            verbose: cli.verbose,
            preview: cli.preview,
        })
    }

    /// Combined virtual raster for the whole product
    pub fn vrt_path(&self) -> PathBuf {
        self.outdir
            .join(format!("{}.{}.vrt", self.product, METRIC_SUFFIX))
    }

    /// Run summary JSON written next to the mosaic
    pub fn report_path(&self) -> PathBuf {
        self.outdir
            .join(format!("{}.{}.json", self.product, METRIC_SUFFIX))
    }

    /// Voxel stack for one feature, or the whole-area stack when no
    /// site vector is in play
    pub fn voxel_input_path(&self, token: Option<&str>) -> PathBuf {
        self.voxdir.join(voxel_file_name(token, &self.voxtype[0]))
    }

    /// Metric raster for one feature
    pub fn metric_output_path(&self, token: Option<&str>) -> PathBuf {
        self.outdir.join(metric_file_name(token, &self.product))
    }
}
