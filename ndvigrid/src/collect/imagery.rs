use chrono::NaiveDate;
use geo::MultiPolygon;

use crate::error::{Error, Result};
use crate::geo_core::BoundingBox;
use crate::raster::{reduce_area, Layer, Raster};

/// Band names every composite must expose
pub const BAND_NIR: &str = "nir";
pub const BAND_RED: &str = "red";
pub const BAND_GREEN: &str = "green";

/// Inclusive date range of the acquisitions to composite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::Config(format!(
                "End date {} is before start date {}",
                end, start
            )));
        }
        Ok(DateRange { start, end })
    }

    /// `start/end` as used by the WMS TIME dimension
    pub fn to_time_param(&self) -> String {
        format!(
            "{}/{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// What to fetch: bounds, dates and the cloud filter
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub bbox: BoundingBox,
    pub dates: DateRange,
    /// Maximum cloud cover percentage accepted for a scene
    pub max_cloud_cover: f64,
}

/// Satellite composite for a date range and bounds.
///
/// Read-only once fetched: holds the NIR, red and (optionally) green bands.
#[derive(Debug, Clone)]
pub struct ImageryFrame {
    raster: Raster,
    request: CompositeRequest,
}

impl ImageryFrame {
    pub fn new(raster: Raster, request: CompositeRequest) -> Result<Self> {
        raster.require_band(BAND_NIR)?;
        raster.require_band(BAND_RED)?;
        Ok(ImageryFrame { raster, request })
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn request(&self) -> &CompositeRequest {
        &self.request
    }

    pub fn has_rgb(&self) -> bool {
        self.raster.band(BAND_GREEN).is_some()
    }
}

/// Earth-observation collaborator.
///
/// `reduce_region` returns the area-weighted sum (m²) of a layer over a
/// region, or `None` when the region holds no valid pixel. The default
/// implementation runs the reduction locally on the fetched raster.
pub trait ImageryBackend {
    fn fetch_composite(&self, request: &CompositeRequest) -> Result<ImageryFrame>;

    fn reduce_region(
        &self,
        layer: Layer<'_>,
        region: &MultiPolygon<f64>,
        scale_m: f64,
        max_pixels: u64,
    ) -> Result<Option<f64>> {
        reduce_area(layer, region, scale_m, max_pixels)
    }

    /// Short name for logs and banners
    fn name(&self) -> &str;
}

impl<B: ImageryBackend + ?Sized> ImageryBackend for Box<B> {
    fn fetch_composite(&self, request: &CompositeRequest) -> Result<ImageryFrame> {
        (**self).fetch_composite(request)
    }

    fn reduce_region(
        &self,
        layer: Layer<'_>,
        region: &MultiPolygon<f64>,
        scale_m: f64,
        max_pixels: u64,
    ) -> Result<Option<f64>> {
        (**self).reduce_region(layer, region, scale_m, max_pixels)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
