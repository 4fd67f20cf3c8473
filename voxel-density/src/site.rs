/// Site vector reading: polygon features with naming tokens.
use crate::error::MetricError;
use geo::{BoundingRect, Coord, Geometry, Rect};
use std::fs;
use std::path::Path;

/// One site polygon and the token that names its input and output files.
pub struct SiteFeature {
    /// Naming token: the feature's `name` property, else its id, else
    /// its index in the collection.
    pub token: String,
    pub geometry: Geometry<f64>,
}

/// Polygon features loaded from a GeoJSON FeatureCollection.
pub struct SiteVector {
    features: Vec<SiteFeature>,
}

impl SiteVector {
    /// Open and parse a site vector file. Any failure here is fatal to
    /// the whole run, unlike per-feature raster problems.
    pub fn open(path: &Path) -> Result<Self, MetricError> {
        let raw = fs::read_to_string(path).map_err(|e| MetricError::SiteVectorOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw).map_err(|reason| MetricError::SiteVectorOpen {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let gj: geojson::GeoJson = raw.parse().map_err(|e: geojson::Error| e.to_string())?;
        let collection = match gj {
            geojson::GeoJson::FeatureCollection(fc) => fc,
            _ => return Err("expected a FeatureCollection of site polygons".to_string()),
        };

        let mut features = Vec::new();
        for (idx, feature) in collection.features.into_iter().enumerate() {
            let token = feature_token(&feature, idx);
            let geometry = feature
                .geometry
                .ok_or_else(|| format!("feature '{}' has no geometry", token))?;
            let geometry = Geometry::try_from(geometry)
                .map_err(|e: geojson::Error| format!("feature '{}': {}", token, e))?;
            match geometry {
                Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {}
                _ => return Err(format!("feature '{}' is not a polygon", token)),
            }
            features.push(SiteFeature { token, geometry });
        }
        if features.is_empty() {
            return Err("site vector holds no features".to_string());
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[SiteFeature] {
        &self.features
    }

    /// Union of all feature bounding rectangles, used to align the
    /// mosaic extent to the site.
    pub fn extent(&self) -> Option<Rect<f64>> {
        let mut rects = self.features.iter().filter_map(|f| f.geometry.bounding_rect());
        let first = rects.next()?;
        Some(rects.fold(first, |acc, r| {
            Rect::new(
                Coord {
                    x: acc.min().x.min(r.min().x),
                    y: acc.min().y.min(r.min().y),
                },
                Coord {
                    x: acc.max().x.max(r.max().x),
                    y: acc.max().y.max(r.max().y),
                },
            )
        }))
    }
}

fn feature_token(feature: &geojson::Feature, idx: usize) -> String {
    if let Some(props) = &feature.properties {
        if let Some(name) = props.get("name").and_then(|v| v.as_str()) {
            return name.to_string();
        }
    }
    match &feature.id {
        Some(geojson::feature::Id::String(s)) => s.clone(),
        Some(geojson::feature::Id::Number(n)) => n.to_string(),
        None => idx.to_string(),
    }
}
