use geo::MultiPolygon;
use serde::Serialize;
use tracing::debug;

use crate::collect::imagery::{ImageryBackend, ImageryFrame, BAND_NIR, BAND_RED};
use crate::error::Result;
use crate::raster::{Layer, Raster};

/// NDVI above which a pixel counts as vegetation
pub const NDVI_THRESHOLD: f64 = 0.3;
/// Ground sampling distance of the area reductions, in metres
pub const SCALE_METERS: f64 = 10.0;

pub const BAND_NDVI: &str = "ndvi";
pub const BAND_VEGETATION: &str = "vegetation";

/// Vegetation areas of one region
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VegetationStats {
    pub total_area_sq_m: f64,
    pub vegetated_area_sq_m: f64,
    /// Vegetated share of the region, 0..=100 with 2 decimals
    pub percentage: f64,
}

impl VegetationStats {
    /// Build the stats from reduction results; missing or zero totals give 0 %.
    pub fn from_areas(total: Option<f64>, vegetated: Option<f64>) -> Self {
        let total_area_sq_m = total.unwrap_or(0.0);
        let vegetated_area_sq_m = vegetated.unwrap_or(0.0);
        let percentage = if total_area_sq_m > 0.0 {
            round2((vegetated_area_sq_m / total_area_sq_m * 100.0).clamp(0.0, 100.0))
        } else {
            0.0
        };
        VegetationStats {
            total_area_sq_m,
            vegetated_area_sq_m,
            percentage,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Normalized difference of NIR and red; `NaN` when undefined.
pub fn ndvi(nir: f64, red: f64) -> f64 {
    let sum = nir + red;
    if nir.is_nan() || red.is_nan() || sum == 0.0 {
        f64::NAN
    } else {
        (nir - red) / sum
    }
}

/// NDVI and vegetation layers derived from a composite.
///
/// The `vegetation` band holds 1 where NDVI > [`NDVI_THRESHOLD`], 0 where NDVI
/// is defined but lower, and no-data elsewhere.
#[derive(Debug, Clone)]
pub struct VegetationMask {
    raster: Raster,
}

impl VegetationMask {
    pub fn from_frame(frame: &ImageryFrame) -> Result<Self> {
        let source = frame.raster();
        let nir = source.require_band(BAND_NIR)?;
        let red = source.require_band(BAND_RED)?;

        let ndvi_data: Vec<f64> = nir.iter().zip(red).map(|(&n, &r)| ndvi(n, r)).collect();
        let mask_data: Vec<f64> = ndvi_data
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    f64::NAN
                } else if v > NDVI_THRESHOLD {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();

        let raster = Raster::new(source.width(), source.height(), source.bbox())
            .with_band(BAND_NDVI, ndvi_data)?
            .with_band(BAND_VEGETATION, mask_data)?;
        Ok(VegetationMask { raster })
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn ndvi_band(&self) -> &[f64] {
        // Both bands are set in from_frame
        self.raster.band(BAND_NDVI).unwrap_or(&[])
    }

    pub fn vegetation_band(&self) -> &[f64] {
        self.raster.band(BAND_VEGETATION).unwrap_or(&[])
    }
}

/// Vegetation statistics of `region` using an existing mask.
///
/// Samples are taken every [`SCALE_METERS`] at sample centres, without partial
/// weighting. A sliver narrower than one sample holds no sample and reports
/// 0 % with zero total area, which means "not measured", not bare ground.
pub fn compute_region_stats<B: ImageryBackend + ?Sized>(
    backend: &B,
    mask: &VegetationMask,
    region: &MultiPolygon<f64>,
    max_pixels: u64,
) -> Result<VegetationStats> {
    let total = backend.reduce_region(Layer::PixelArea, region, SCALE_METERS, max_pixels)?;
    let vegetated = backend.reduce_region(
        Layer::Band {
            raster: mask.raster(),
            band: BAND_VEGETATION,
        },
        region,
        SCALE_METERS,
        max_pixels,
    )?;
    let stats = VegetationStats::from_areas(total, vegetated);
    debug!(
        total = stats.total_area_sq_m,
        vegetated = stats.vegetated_area_sq_m,
        percentage = stats.percentage,
        "Region reduced"
    );
    Ok(stats)
}

/// Vegetation mask of the composite and statistics of `region`.
pub fn compute_stats<B: ImageryBackend + ?Sized>(
    backend: &B,
    frame: &ImageryFrame,
    region: &MultiPolygon<f64>,
    max_pixels: u64,
) -> Result<(VegetationMask, VegetationStats)> {
    let mask = VegetationMask::from_frame(frame)?;
    let stats = compute_region_stats(backend, &mask, region, max_pixels)?;
    Ok((mask, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::imagery::{CompositeRequest, DateRange};
    use crate::collect::synthetic::SyntheticImagery;
    use crate::error::Error;
    use crate::geo_core::BoundingBox;
    use chrono::NaiveDate;
    use geo::{polygon, MultiPolygon};

    fn frame_for(backend: &SyntheticImagery, bbox: BoundingBox) -> ImageryFrame {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        backend
            .fetch_composite(&CompositeRequest {
                bbox,
                dates: DateRange::new(day, day).unwrap(),
                max_cloud_cover: 20.0,
            })
            .unwrap()
    }

    fn region(bbox: BoundingBox) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![bbox.to_polygon()])
    }

    #[test]
    fn test_ndvi() {
        assert!((ndvi(0.5, 0.1) - 0.6667).abs() < 1e-4);
        assert_eq!(ndvi(0.2, 0.2), 0.0);
        assert!(ndvi(0.0, 0.0).is_nan());
        assert!(ndvi(f64::NAN, 0.1).is_nan());
    }

    #[test]
    fn test_zero_total_area() {
        let stats = VegetationStats::from_areas(Some(0.0), Some(0.0));
        assert_eq!(stats.percentage, 0.0);
        let stats = VegetationStats::from_areas(None, None);
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn test_percentage_rounding_and_bounds() {
        let stats = VegetationStats::from_areas(Some(3.0), Some(1.0));
        assert_eq!(stats.percentage, 33.33);
        let stats = VegetationStats::from_areas(Some(100.0), Some(150.0));
        assert_eq!(stats.percentage, 100.0);
        let stats = VegetationStats::from_areas(Some(7.0), Some(2.0));
        assert_eq!(stats.percentage, 28.57);
        assert_eq!((stats.percentage * 100.0).round() / 100.0, stats.percentage);
    }

    #[test]
    fn test_uniform_vegetation() {
        let bbox = BoundingBox::new(0.0, 0.0, 0.005, 0.005);
        let backend = SyntheticImagery::uniform(0.5, 0.1);
        let frame = frame_for(&backend, bbox);
        let (mask, stats) = compute_stats(&backend, &frame, &region(bbox), 1_000_000).unwrap();
        assert_eq!(stats.percentage, 100.0);
        assert!(stats.total_area_sq_m > 0.0);
        assert!(mask.vegetation_band().iter().all(|&v| v == 1.0));

        let bare = SyntheticImagery::uniform(0.2, 0.18);
        let frame = frame_for(&bare, bbox);
        let (_, stats) = compute_stats(&bare, &frame, &region(bbox), 1_000_000).unwrap();
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn test_split_vegetation() {
        let bbox = BoundingBox::new(0.0, 0.0, 0.01, 0.01);
        let backend = SyntheticImagery::split(0.005);
        let frame = frame_for(&backend, bbox);
        let (_, stats) = compute_stats(&backend, &frame, &region(bbox), 1_000_000).unwrap();
        assert!(
            (stats.percentage - 50.0).abs() < 3.0,
            "percentage = {}",
            stats.percentage
        );
        assert!((0.0..=100.0).contains(&stats.percentage));
    }

    #[test]
    fn test_region_outside_imagery() {
        let backend = SyntheticImagery::uniform(0.5, 0.1);
        let frame = frame_for(&backend, BoundingBox::new(0.0, 0.0, 0.005, 0.005));
        let far = polygon![
            (x: 1.0, y: 1.0),
            (x: 1.005, y: 1.0),
            (x: 1.005, y: 1.005),
            (x: 1.0, y: 1.005),
        ];
        let (_, stats) =
            compute_stats(&backend, &frame, &MultiPolygon::new(vec![far]), 1_000_000).unwrap();
        assert!(stats.total_area_sq_m > 0.0);
        assert_eq!(stats.vegetated_area_sq_m, 0.0);
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn test_sliver_is_unmeasured() {
        let bbox = BoundingBox::new(0.0, 0.0, 0.005, 0.005);
        let backend = SyntheticImagery::uniform(0.5, 0.1);
        let frame = frame_for(&backend, bbox);
        // 1 m wide strip, narrower than one sample
        let strip = polygon![
            (x: 0.00101, y: 0.0),
            (x: 0.0010190, y: 0.0),
            (x: 0.0010190, y: 0.005),
            (x: 0.00101, y: 0.005),
        ];
        let (_, stats) =
            compute_stats(&backend, &frame, &MultiPolygon::new(vec![strip]), 1_000_000).unwrap();
        assert_eq!(stats.total_area_sq_m, 0.0);
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn test_pixel_ceiling() {
        let bbox = BoundingBox::new(0.0, 0.0, 0.01, 0.01);
        let backend = SyntheticImagery::uniform(0.5, 0.1);
        let frame = frame_for(&backend, bbox);
        let result = compute_stats(&backend, &frame, &region(bbox), 100);
        assert!(matches!(result, Err(Error::Computation(_))));
    }
}
