/// Error types for metric processing operations.
use density_grid::KernelError;
use std::path::PathBuf;

#[derive(Debug)]
pub enum MetricError {
    InvalidArgument(String),
    InputNotFound(PathBuf),
    SiteVectorOpen { path: PathBuf, reason: String },
    Raster(tiff::TiffError),
    Io(std::io::Error),
    Geometry(String),
    Image(image::ImageError),
    Report(serde_json::Error),
    Kernel(KernelError),
}

impl From<std::io::Error> for MetricError {
    fn from(err: std::io::Error) -> Self {
        MetricError::Io(err)
    }
}

impl From<tiff::TiffError> for MetricError {
    fn from(err: tiff::TiffError) -> Self {
        MetricError::Raster(err)
    }
}

impl From<image::ImageError> for MetricError {
    fn from(err: image::ImageError) -> Self {
        MetricError::Image(err)
    }
}

impl From<serde_json::Error> for MetricError {
    fn from(err: serde_json::Error) -> Self {
        MetricError::Report(err)
    }
}

impl From<KernelError> for MetricError {
    fn from(err: KernelError) -> Self {
        MetricError::Kernel(err)
    }
}

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            MetricError::InputNotFound(path) => {
                write!(f, "voxel raster not found: {}", path.display())
            }
            MetricError::SiteVectorOpen { path, reason } => {
                write!(f, "cannot open site vector {}: {}", path.display(), reason)
            }
            MetricError::Raster(e) => write!(f, "raster error: {}", e),
            MetricError::Io(e) => write!(f, "IO error: {}", e),
            MetricError::Geometry(msg) => write!(f, "geometry error: {}", msg),
            MetricError::Image(e) => write!(f, "image error: {}", e),
            MetricError::Report(e) => write!(f, "report error: {}", e),
            MetricError::Kernel(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MetricError {}
