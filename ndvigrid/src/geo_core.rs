use geo::{BoundingRect, Coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Metres per degree of longitude at the reference latitude
pub const METERS_PER_DEG_LON: f64 = 111_320.0;
/// Metres per degree of latitude at the reference latitude
pub const METERS_PER_DEG_LAT: f64 = 110_540.0;

/// WGS84, the only CRS handled here
pub const EPSG_WGS84: i32 = 4326;

/// Convert a horizontal distance in metres to degrees of longitude.
///
/// Equirectangular approximation with a fixed factor: accurate near the
/// equator only, error grows with latitude.
pub fn meters_to_deg_lon(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LON
}

/// Convert a vertical distance in metres to degrees of latitude.
pub fn meters_to_deg_lat(meters: f64) -> f64 {
    meters / METERS_PER_DEG_LAT
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box of a polygon's exterior ring.
    /// Returns `None` for an empty polygon.
    pub fn from_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        polygon.bounding_rect().map(Self::from)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Centre as (lon, lat)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_x && lon <= self.max_x && lat >= self.min_y && lat <= self.max_y
    }

    /// Leaflet ordering: `[[south, west], [north, east]]`
    pub fn to_leaflet_bounds(&self) -> [[f64; 2]; 2] {
        [[self.min_y, self.min_x], [self.max_y, self.max_x]]
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::from(*self).to_polygon()
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl From<BoundingBox> for Rect<f64> {
    fn from(bbox: BoundingBox) -> Self {
        Rect::new(
            Coord {
                x: bbox.min_x,
                y: bbox.min_y,
            },
            Coord {
                x: bbox.max_x,
                y: bbox.max_y,
            },
        )
    }
}
