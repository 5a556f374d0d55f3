use geo::{Geometry as GeoGeometry, LineString, Polygon};
use geojson::GeoJson;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::geo_core::BoundingBox;

/// Load the boundary polygon from a GeoJSON file.
pub fn load_polygon(path: &Path) -> Result<Polygon<f64>> {
    let content = std::fs::read_to_string(path)?;
    let polygon = parse_polygon(&content)?;
    if let Some(bbox) = BoundingBox::from_polygon(&polygon) {
        info!(path = %path.display(), ?bbox, "Boundary loaded");
    }
    Ok(polygon)
}

/// Parse a GeoJSON document (FeatureCollection, Feature or bare geometry)
/// into the exterior ring of its first polygon.
///
/// Multi-part inputs are not supported. Interior rings are dropped.
pub fn parse_polygon(content: &str) -> Result<Polygon<f64>> {
    let geojson: GeoJson = content
        .parse()
        .map_err(|e| Error::format(format!("Invalid GeoJSON: {}", e)))?;

    let geometry = match geojson {
        GeoJson::FeatureCollection(fc) => {
            if fc.features.len() > 1 {
                warn!(
                    features = fc.features.len(),
                    "Only the first feature of the collection is used"
                );
            }
            let feature = fc
                .features
                .into_iter()
                .next()
                .ok_or_else(|| Error::format("FeatureCollection contains no features"))?;
            feature
                .geometry
                .ok_or_else(|| Error::format("First feature has no geometry"))?
        }
        GeoJson::Feature(feature) => feature
            .geometry
            .ok_or_else(|| Error::format("Feature has no geometry"))?,
        GeoJson::Geometry(geometry) => geometry,
    };

    let geo_geom: GeoGeometry<f64> = geometry
        .try_into()
        .map_err(|e| Error::format(format!("Unsupported geometry: {}", e)))?;

    let polygon = match geo_geom {
        GeoGeometry::Polygon(poly) => poly,
        GeoGeometry::MultiPolygon(_) => {
            return Err(Error::format(
                "MultiPolygon boundaries are not supported, provide a single polygon",
            ))
        }
        other => {
            return Err(Error::format(format!(
                "Expected a Polygon geometry, found {}",
                geometry_type_name(&other)
            )))
        }
    };

    normalize(polygon)
}

/// Keep the exterior ring only and check it encloses something.
fn normalize(polygon: Polygon<f64>) -> Result<Polygon<f64>> {
    let (exterior, interiors) = polygon.into_inner();
    if !interiors.is_empty() {
        warn!(holes = interiors.len(), "Interior rings ignored");
    }

    let mut distinct = exterior.0.clone();
    distinct.dedup();
    if distinct.first() == distinct.last() {
        distinct.pop();
    }
    if distinct.len() < 3 {
        return Err(Error::format(format!(
            "Polygon ring needs at least 3 distinct points, found {}",
            distinct.len()
        )));
    }
    if distinct.iter().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return Err(Error::format("Polygon ring contains non-finite coordinates"));
    }

    // Polygon::new closes the ring
    Ok(Polygon::new(LineString::from(distinct), vec![]))
}

fn geometry_type_name(geometry: &GeoGeometry<f64>) -> &'static str {
    match geometry {
        GeoGeometry::Point(_) => "Point",
        GeoGeometry::Line(_) => "Line",
        GeoGeometry::LineString(_) => "LineString",
        GeoGeometry::Polygon(_) => "Polygon",
        GeoGeometry::MultiPoint(_) => "MultiPoint",
        GeoGeometry::MultiLineString(_) => "MultiLineString",
        GeoGeometry::MultiPolygon(_) => "MultiPolygon",
        GeoGeometry::GeometryCollection(_) => "GeometryCollection",
        GeoGeometry::Rect(_) => "Rect",
        GeoGeometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SQUARE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "talhao"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [0.01, 0.0], [0.01, 0.01], [0.0, 0.01], [0.0, 0.0]]]
            }
        }]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let poly = parse_polygon(SQUARE).unwrap();
        assert_eq!(poly.exterior().0.len(), 5);
        assert!(poly.exterior().is_closed());
        let bbox = BoundingBox::from_polygon(&poly).unwrap();
        assert!(bbox.min_x <= bbox.max_x && bbox.min_y <= bbox.max_y);
        assert_eq!(bbox.max_x, 0.01);
    }

    #[test]
    fn test_parse_open_ring_is_closed() {
        let content = r#"{"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1]]]}"#;
        let poly = parse_polygon(content).unwrap();
        assert!(poly.exterior().is_closed());
    }

    #[test]
    fn test_parse_drops_holes() {
        let content = r#"{"type": "Feature", "properties": null, "geometry": {"type": "Polygon", "coordinates": [
            [[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]],
            [[1, 1], [2, 1], [2, 2], [1, 1]]
        ]}}"#;
        let poly = parse_polygon(content).unwrap();
        assert!(poly.interiors().is_empty());
    }

    #[test]
    fn test_empty_collection() {
        let content = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(parse_polygon(content), Err(Error::Format(_))));
    }

    #[test]
    fn test_non_polygon() {
        let content = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        let err = parse_polygon(content).unwrap_err();
        assert!(err.to_string().contains("Point"));

        let multi = r#"{"type": "MultiPolygon", "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]]]}"#;
        assert!(matches!(parse_polygon(multi), Err(Error::Format(_))));
    }

    #[test]
    fn test_degenerate_ring() {
        let content = r#"{"type": "Polygon", "coordinates": [[[0, 0], [1, 1], [0, 0], [0, 0]]]}"#;
        assert!(matches!(parse_polygon(content), Err(Error::Format(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_polygon("{not json"), Err(Error::Format(_))));
    }

    #[test]
    fn test_load_polygon_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SQUARE.as_bytes()).unwrap();
        let poly = load_polygon(file.path()).unwrap();
        assert_eq!(BoundingBox::from_polygon(&poly).unwrap().min_y, 0.0);

        assert!(matches!(
            load_polygon(Path::new("/nonexistent/area.geojson")),
            Err(Error::Io(_))
        ));
    }
}
