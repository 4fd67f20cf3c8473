/// Per-feature orchestration: read voxels, compute the metric, write,
/// clip, and mosaic.
use crate::clip::clip_to_feature;
use crate::config::ProcessingConfig;
use crate::error::MetricError;
use crate::preview::write_preview;
use crate::raster_io::{read_metric_raster, read_voxel_raster, write_metric_raster};
use crate::site::{SiteFeature, SiteVector};
use crate::vrt::{MosaicPiece, build_vrt};
use density_grid::relative_density;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

/// What happened to one site feature.
#[derive(Debug, Serialize)]
pub struct FeatureOutcome {
    pub feature: String,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

/// Run summary written next to the mosaic and printed at the end.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub product: String,
    pub voxtype: Vec<String>,
    pub start: usize,
    pub stop: usize,
    pub pixelsize: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<FeatureOutcome>,
    pub mosaic: Option<PathBuf>,
    pub elapsed_secs: f64,
}

pub enum RunStatus {
    /// All products already on disk and overwrite not requested
    AlreadyComplete,
    Completed(RunReport),
}

pub struct VoxelMetricProcessor {
    config: ProcessingConfig,
}

impl VoxelMetricProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Process every site feature, tolerating per-feature failures, then
    /// assemble the mosaic and the run report. The only error that
    /// escapes besides setup IO problems is a site vector that will not
    /// open.
    pub fn run(&self) -> Result<RunStatus, MetricError> {
        let started = Instant::now();
        fs::create_dir_all(&self.config.outdir)?;

        let vrt_path = self.config.vrt_path();
        if vrt_path.exists() && !self.config.overwrite {
            println!(
                "Already created metric rasters in {}",
                self.config.outdir.display()
            );
            return Ok(RunStatus::AlreadyComplete);
        }

        let site = match &self.config.site {
            Some(path) => Some(SiteVector::open(path)?),
            None => None,
        };
        let features: Vec<Option<&SiteFeature>> = match &site {
            Some(site) => site.features().iter().map(Some).collect(),
            None => vec![None],
        };

        println!(
            "Processing {} feature(s) into {}",
            features.len(),
            self.config.outdir.display()
        );

        let pb = ProgressBar::new(features.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.green/blue}] {pos}/{len} features ({percent}%) {msg}")
                .unwrap()
                .progress_chars("▉▊▋▌▍▎▏ "),
        );
        pb.set_message("Computing relative density");

        // every iteration is independent, so fan the features out over a
        // worker pool
        let results: Vec<(String, Result<MosaicPiece, MetricError>)> = features
            .par_iter()
            .map(|feature| {
                let label = feature
                    .map(|f| f.token.clone())
                    .unwrap_or_else(|| "whole-area".to_string());
                let result = self.process_feature(*feature);
                pb.inc(1);
                (label, result)
            })
            .collect();
        pb.finish_with_message("Features processed");

        let mut outcomes = Vec::new();
        let mut pieces = Vec::new();
        for (label, result) in results {
            match result {
                Ok(piece) => {
                    outcomes.push(FeatureOutcome {
                        feature: label,
                        output: Some(piece.path.clone()),
                        error: None,
                    });
                    pieces.push(piece);
                }
                Err(err) => {
                    println!("Error creating metric for '{}': {}", label, err);
                    if self.config.verbose {
                        println!("{:?}", err);
                    }
                    outcomes.push(FeatureOutcome {
                        feature: label,
                        output: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let mosaic = if pieces.is_empty() {
            println!("No metric rasters were produced, skipping mosaic");
            None
        } else {
            build_vrt(
                &pieces,
                &vrt_path,
                site.as_ref().and_then(|s| s.extent()),
            )?;
            Some(vrt_path.clone())
        };

        let succeeded = pieces.len();
        let failed = outcomes.len() - succeeded;
        let report = RunReport {
            product: self.config.product.clone(),
            voxtype: self.config.voxtype.clone(),
            start: self.config.start,
            stop: self.config.stop,
            pixelsize: self.config.pixelsize,
            succeeded,
            failed,
            outcomes,
            mosaic,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        self.write_report(&report)?;
        self.print_summary(&report);

        Ok(RunStatus::Completed(report))
    }

    /// One feature end to end. Any error here is that feature's failure
    /// and never aborts the run.
    fn process_feature(&self, feature: Option<&SiteFeature>) -> Result<MosaicPiece, MetricError> {
        let token = feature.map(|f| f.token.as_str());
        let input = self.config.voxel_input_path(token);
        let output = self.config.metric_output_path(token);
        println!("{}", output.display());

        let (voxels, mut metadata) = read_voxel_raster(&input)?;
        if self.config.verbose {
            println!(
                "voxel dimensions: {}, {}, {}",
                voxels.bands(),
                voxels.rows(),
                voxels.cols()
            );
        }

        let aggregated = voxels.aggregate(self.config.pixelsize)?;
        if self.config.verbose {
            println!(
                "aggregated dimensions: {}, {}, {}",
                aggregated.bands(),
                aggregated.rows(),
                aggregated.cols()
            );
        }

        let density = relative_density(&aggregated, self.config.start, self.config.stop)?;

        metadata.transform = metadata
            .transform
            .with_pixel_size(self.config.pixelsize as f64);
        write_metric_raster(
            &output,
            density.as_slice(),
            density.cols(),
            density.rows(),
            &metadata,
        )?;

        let (cols, rows, transform) = match feature {
            Some(f) => {
                let clipped = clip_to_feature(&output, f)?;
                (clipped.cols, clipped.rows, clipped.transform)
            }
            None => (density.cols(), density.rows(), metadata.transform),
        };

        if self.config.preview {
            let (data, pcols, prows, _) = read_metric_raster(&output)?;
            write_preview(&output, &data, pcols, prows)?;
        }

        Ok(MosaicPiece {
            path: output,
            cols,
            rows,
            transform,
            projection: metadata.projection.clone(),
        })
    }

    fn write_report(&self, report: &RunReport) -> Result<(), MetricError> {
        let path = self.config.report_path();
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        Ok(())
    }

    fn print_summary(&self, report: &RunReport) {
        println!(
            "Processed {} feature(s): {} succeeded, {} failed",
            report.outcomes.len(),
            report.succeeded,
            report.failed
        );
        if report.failed > 0 {
            println!("Failures:");
            for outcome in report.outcomes.iter().filter(|o| o.error.is_some()) {
                println!(
                    "  {}: {}",
                    outcome.feature,
                    outcome.error.as_deref().unwrap_or("unknown")
                );
            }
        }
        if let Some(mosaic) = &report.mosaic {
            println!("Mosaic: {}", mosaic.display());
        }
        println!(
            "voxel-density completed ({}) in {:.1}s",
            self.config.outdir.display(),
            report.elapsed_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use crate::georef::{GeoTransform, RasterMetadata};
    use crate::raster_io::write_voxel_raster;
    use approx::assert_relative_eq;
    use clap::Parser;
    use density_grid::VoxelGrid;
    use std::path::Path;
    use tempfile::tempdir;

    /// (10,2,2) stack: band 0 empty, bands 1-5 hold 2 in cell (0,0),
    /// bands 6-9 hold 1 there. Expected metric at (0,0) with the default
    /// 1..5 region is sqrt(8/14) + 0.001.
    fn sample_grid() -> VoxelGrid {
        let mut grid = VoxelGrid::zeroed(10, 2, 2).unwrap();
        for band in 1..=5 {
            grid.set(band, 0, 0, 2.0);
        }
        for band in 6..=9 {
            grid.set(band, 0, 0, 1.0);
        }
        grid
    }

    fn sample_metadata() -> RasterMetadata {
        RasterMetadata {
            projection: "EPSG:32618".to_string(),
            transform: GeoTransform::new(0.0, 1.0, 0.0, 2.0, 0.0, -1.0),
        }
    }

    fn write_site(path: &Path) {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"name": "alpha"},
                    "geometry": {"type": "Polygon", "coordinates":
                        [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "beta"},
                    "geometry": {"type": "Polygon", "coordinates":
                        [[[5.0, 5.0], [7.0, 5.0], [7.0, 7.0], [5.0, 7.0], [5.0, 5.0]]]}
                }
            ]
        }"#;
        fs::write(path, geojson).unwrap();
    }

    fn config_for(args: &[&str]) -> ProcessingConfig {
        let mut full = vec!["voxel-density"];
        full.extend_from_slice(args);
        ProcessingConfig::from_cli(&Cli::parse_from(full)).unwrap()
    }

    #[test]
    fn test_end_to_end_with_site() {
        let dir = tempdir().unwrap();
        let voxdir = dir.path().join("vox");
        let outdir = dir.path().join("out");
        fs::create_dir_all(&voxdir).unwrap();

        // alpha has a voxel stack, beta's input is deliberately missing
        write_voxel_raster(
            &voxdir.join("alpha_voxels.count.tif"),
            &sample_grid(),
            &sample_metadata(),
        )
        .unwrap();
        let site_path = dir.path().join("site.geojson");
        write_site(&site_path);

        let config = config_for(&[
            voxdir.to_str().unwrap(),
            "--site",
            site_path.to_str().unwrap(),
            "--outdir",
            outdir.to_str().unwrap(),
        ]);
        let processor = VoxelMetricProcessor::new(config);
        let status = processor.run().unwrap();

        let report = match status {
            RunStatus::Completed(report) => report,
            RunStatus::AlreadyComplete => panic!("expected a full run"),
        };
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);

        let metric_path = outdir.join("alpha_rdm-1_to_5.voxel_metric.tif");
        let (data, cols, rows, metadata) = read_metric_raster(&metric_path).unwrap();
        assert_eq!((cols, rows), (2, 2));
        assert_eq!(metadata.transform.pixel_width(), 1.0);
        let expected = (8.0f64 / 14.0).sqrt() + 0.001;
        assert_relative_eq!(data[0] as f64, expected, epsilon = 1e-6);
        assert_eq!(data[1], 0.001);

        let vrt = fs::read_to_string(outdir.join("rdm-1_to_5.voxel_metric.vrt")).unwrap();
        assert!(vrt.contains("SimpleSource"));
        assert!(vrt.contains("alpha_rdm-1_to_5.voxel_metric.tif"));

        let report_json =
            fs::read_to_string(outdir.join("rdm-1_to_5.voxel_metric.json")).unwrap();
        assert!(report_json.contains("\"beta\""));
        assert!(report_json.contains("voxel raster not found"));
    }

    #[test]
    fn test_whole_area_run_without_site() {
        let dir = tempdir().unwrap();
        let voxdir = dir.path().join("vox");
        let outdir = dir.path().join("out");
        fs::create_dir_all(&voxdir).unwrap();
        write_voxel_raster(
            &voxdir.join("voxels.count.tif"),
            &sample_grid(),
            &sample_metadata(),
        )
        .unwrap();

        let config = config_for(&[
            voxdir.to_str().unwrap(),
            "--outdir",
            outdir.to_str().unwrap(),
            "--preview",
        ]);
        let status = VoxelMetricProcessor::new(config).run().unwrap();

        let report = match status {
            RunStatus::Completed(report) => report,
            RunStatus::AlreadyComplete => panic!("expected a full run"),
        };
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert!(outdir.join("rdm-1_to_5.voxel_metric.tif").exists());
        assert!(outdir.join("rdm-1_to_5.voxel_metric.png").exists());
        assert!(outdir.join("rdm-1_to_5.voxel_metric.vrt").exists());
    }

    #[test]
    fn test_aggregation_applies_before_ratio() {
        let dir = tempdir().unwrap();
        let voxdir = dir.path().join("vox");
        let outdir = dir.path().join("out");
        fs::create_dir_all(&voxdir).unwrap();
        write_voxel_raster(
            &voxdir.join("voxels.count.tif"),
            &sample_grid(),
            &sample_metadata(),
        )
        .unwrap();

        let config = config_for(&[
            voxdir.to_str().unwrap(),
            "--outdir",
            outdir.to_str().unwrap(),
            "--pixelsize",
            "2",
        ]);
        let status = VoxelMetricProcessor::new(config).run().unwrap();
        let report = match status {
            RunStatus::Completed(report) => report,
            RunStatus::AlreadyComplete => panic!("expected a full run"),
        };
        assert_eq!(report.succeeded, 1);

        // the whole 2x2 footprint collapses into one cell, same masses
        let (data, cols, rows, metadata) =
            read_metric_raster(&outdir.join("rdm-1_to_5.voxel_metric.tif")).unwrap();
        assert_eq!((cols, rows), (1, 1));
        assert_eq!(metadata.transform.pixel_width(), 2.0);
        assert_eq!(metadata.transform.pixel_height(), -2.0);
        let expected = (8.0f64 / 14.0).sqrt() + 0.001;
        assert_relative_eq!(data[0] as f64, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_early_exit_when_outputs_exist() {
        let dir = tempdir().unwrap();
        let voxdir = dir.path().join("vox");
        let outdir = dir.path().join("out");
        fs::create_dir_all(&voxdir).unwrap();
        fs::create_dir_all(&outdir).unwrap();
        fs::write(outdir.join("rdm-1_to_5.voxel_metric.vrt"), "stale").unwrap();

        let config = config_for(&[
            voxdir.to_str().unwrap(),
            "--outdir",
            outdir.to_str().unwrap(),
        ]);
        let status = VoxelMetricProcessor::new(config).run().unwrap();
        assert!(matches!(status, RunStatus::AlreadyComplete));
        // untouched
        assert_eq!(
            fs::read_to_string(outdir.join("rdm-1_to_5.voxel_metric.vrt")).unwrap(),
            "stale"
        );
    }

    #[test]
    fn test_unopenable_site_vector_is_fatal() {
        let dir = tempdir().unwrap();
        let config = config_for(&[
            dir.path().join("vox").to_str().unwrap(),
            "--site",
            dir.path().join("absent.geojson").to_str().unwrap(),
            "--outdir",
            dir.path().join("out").to_str().unwrap(),
        ]);
        let err = VoxelMetricProcessor::new(config).run().unwrap_err();
        assert!(matches!(err, MetricError::SiteVectorOpen { .. }));
    }

    #[test]
    fn test_run_survives_all_features_failing() {
        let dir = tempdir().unwrap();
        let voxdir = dir.path().join("vox");
        let outdir = dir.path().join("out");
        fs::create_dir_all(&voxdir).unwrap();
        let site_path = dir.path().join("site.geojson");
        write_site(&site_path);

        let config = config_for(&[
            voxdir.to_str().unwrap(),
            "--site",
            site_path.to_str().unwrap(),
            "--outdir",
            outdir.to_str().unwrap(),
        ]);
        let status = VoxelMetricProcessor::new(config).run().unwrap();
        let report = match status {
            RunStatus::Completed(report) => report,
            RunStatus::AlreadyComplete => panic!("expected a full run"),
        };
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 2);
        assert!(report.mosaic.is_none());
        assert!(!outdir.join("rdm-1_to_5.voxel_metric.vrt").exists());
    }
}
