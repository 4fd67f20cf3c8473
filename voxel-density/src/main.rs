/// Voxel lidar rasters to relative density metric rasters entry point
mod clip;
mod config;
mod constants;
mod error;
mod georef;
mod preview;
mod processor;
mod raster_io;
mod site;
mod vrt;

use clap::Parser;
use config::{Cli, ProcessingConfig};
use error::MetricError;
use processor::VoxelMetricProcessor;

fn main() {
    let cli = Cli::parse();

    let config = match ProcessingConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    let processor = VoxelMetricProcessor::new(config);
    match processor.run() {
        Ok(_) => {}
        Err(MetricError::SiteVectorOpen { path, reason }) => {
            eprintln!("Error opening {}: {}", path.display(), reason);
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}
