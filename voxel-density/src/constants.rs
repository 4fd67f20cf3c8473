/// Shared configuration for metric raster production

/// Value written into masked and padded cells. Real data is floored at
/// 0.001 by the density transform, so zero stays unambiguous.
pub const NODATA_VALUE: f32 = 0.0;

/// Suffix shared by every product of this tool
pub const METRIC_SUFFIX: &str = "voxel_metric";

/// File name of a feature's voxel stack given its naming token
pub fn voxel_file_name(token: Option<&str>, voxtype: &str) -> String {
    match token {
        Some(t) => format!("{}_voxels.{}.tif", t, voxtype),
        None => format!("voxels.{}.tif", voxtype),
    }
}

/// File name of a feature's metric raster. Only the token segment before
/// the first underscore carries into the output name.
pub fn metric_file_name(token: Option<&str>, product: &str) -> String {
    match token {
        Some(t) => {
            let ftr = t.split('_').next().unwrap_or(t);
            format!("{}_{}.{}.tif", ftr, product, METRIC_SUFFIX)
        }
        None => format!("{}.{}.tif", product, METRIC_SUFFIX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_file_name() {
        assert_eq!(
            voxel_file_name(Some("siteA_2019"), "count"),
            "siteA_2019_voxels.count.tif"
        );
        assert_eq!(voxel_file_name(None, "intensity"), "voxels.intensity.tif");
    }

    #[test]
    fn test_metric_file_name_uses_first_token_segment() {
        assert_eq!(
            metric_file_name(Some("siteA_2019"), "rdm-1_to_5"),
            "siteA_rdm-1_to_5.voxel_metric.tif"
        );
        assert_eq!(
            metric_file_name(None, "rdm-1_to_5"),
            "rdm-1_to_5.voxel_metric.tif"
        );
    }
}
