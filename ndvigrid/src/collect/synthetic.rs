use tracing::debug;

use crate::collect::imagery::{
    CompositeRequest, ImageryBackend, ImageryFrame, BAND_GREEN, BAND_NIR, BAND_RED,
};
use crate::error::{Error, Result};
use crate::geo_core::{meters_to_deg_lat, meters_to_deg_lon};
use crate::raster::Raster;

/// Reflectances (nir, red, green) at a (lon, lat) pixel centre
pub type ReflectanceFn = dyn Fn(f64, f64) -> (f64, f64, f64) + Send + Sync;

/// Deterministic in-memory backend.
///
/// Builds the composite from a reflectance function sampled at
/// `resolution_m`, so analyses run without network access.
pub struct SyntheticImagery {
    resolution_m: f64,
    reflectance: Box<ReflectanceFn>,
    fail_with: Option<String>,
}

impl SyntheticImagery {
    pub fn new<F>(resolution_m: f64, reflectance: F) -> Self
    where
        F: Fn(f64, f64) -> (f64, f64, f64) + Send + Sync + 'static,
    {
        SyntheticImagery {
            resolution_m,
            reflectance: Box::new(reflectance),
            fail_with: None,
        }
    }

    /// Same reflectance everywhere
    pub fn uniform(nir: f64, red: f64) -> Self {
        Self::new(10.0, move |_, _| (nir, red, red))
    }

    /// Dense vegetation west of `split_lon`, bare soil east of it
    pub fn split(split_lon: f64) -> Self {
        Self::new(10.0, move |lon, _| {
            if lon < split_lon {
                (0.45, 0.05, 0.08)
            } else {
                (0.20, 0.18, 0.15)
            }
        })
    }

    /// Backend whose fetches always fail, for exercising error paths
    pub fn failing(message: &str) -> Self {
        SyntheticImagery {
            fail_with: Some(message.to_string()),
            ..Self::uniform(0.0, 0.0)
        }
    }
}

impl ImageryBackend for SyntheticImagery {
    fn fetch_composite(&self, request: &CompositeRequest) -> Result<ImageryFrame> {
        if let Some(ref message) = self.fail_with {
            return Err(Error::fetch(message.clone()));
        }

        let bbox = request.bbox;
        let dx = meters_to_deg_lon(self.resolution_m);
        let dy = meters_to_deg_lat(self.resolution_m);
        let width = ((bbox.width() / dx).ceil() as usize).max(1);
        let height = ((bbox.height() / dy).ceil() as usize).max(1);
        let (px, py) = (bbox.width() / width as f64, bbox.height() / height as f64);

        let mut nir = Vec::with_capacity(width * height);
        let mut red = Vec::with_capacity(width * height);
        let mut green = Vec::with_capacity(width * height);
        for row in 0..height {
            let lat = bbox.max_y - (row as f64 + 0.5) * py;
            for col in 0..width {
                let lon = bbox.min_x + (col as f64 + 0.5) * px;
                let (n, r, g) = (self.reflectance)(lon, lat);
                nir.push(n);
                red.push(r);
                green.push(g);
            }
        }
        debug!(width, height, "Synthetic composite generated");

        let raster = Raster::new(width, height, bbox)
            .with_band(BAND_NIR, nir)?
            .with_band(BAND_RED, red)?
            .with_band(BAND_GREEN, green)?;
        ImageryFrame::new(raster, request.clone())
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::imagery::DateRange;
    use crate::geo_core::BoundingBox;
    use chrono::NaiveDate;

    fn request() -> CompositeRequest {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        CompositeRequest {
            bbox: BoundingBox::new(0.0, 0.0, 0.01, 0.01),
            dates: DateRange::new(day, day).unwrap(),
            max_cloud_cover: 10.0,
        }
    }

    #[test]
    fn test_split_composite() {
        let frame = SyntheticImagery::split(0.005)
            .fetch_composite(&request())
            .unwrap();
        let raster = frame.raster();
        assert_eq!(raster.width(), 112);
        assert!(frame.has_rgb());
        let nir = raster.band(BAND_NIR).unwrap();
        assert_eq!(raster.value_at(nir, 0.001, 0.005), Some(0.45));
        assert_eq!(raster.value_at(nir, 0.009, 0.005), Some(0.20));
    }

    #[test]
    fn test_failing_backend() {
        let result = SyntheticImagery::failing("quota exceeded").fetch_composite(&request());
        assert!(matches!(result, Err(Error::Fetch(msg)) if msg == "quota exceeded"));
    }
}
