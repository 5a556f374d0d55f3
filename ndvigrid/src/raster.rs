use std::io::Cursor;

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo_core::{meters_to_deg_lat, meters_to_deg_lon, BoundingBox};

/// Georeferenced multi-band raster in EPSG:4326.
///
/// Pixel (0, 0) is the top-left corner, at (`bbox.min_x`, `bbox.max_y`).
/// Bands are stored row-major; `NaN` marks no-data.
#[derive(Debug, Clone)]
pub struct Raster {
    width: usize,
    height: usize,
    bbox: BoundingBox,
    band_names: Vec<String>,
    bands: Vec<Vec<f64>>,
}

/// Weight layer handed to [`reduce_area`].
#[derive(Debug, Clone, Copy)]
pub enum Layer<'a> {
    /// Weight 1 everywhere: the reduction yields the area of the region
    PixelArea,
    /// Pixel values of a named band; no-data samples contribute nothing
    Band { raster: &'a Raster, band: &'a str },
}

impl Raster {
    pub fn new(width: usize, height: usize, bbox: BoundingBox) -> Self {
        Raster {
            width,
            height,
            bbox,
            band_names: Vec::new(),
            bands: Vec::new(),
        }
    }

    /// Add (or replace) a named band.
    pub fn with_band(mut self, name: &str, data: Vec<f64>) -> Result<Self> {
        if data.len() != self.width * self.height {
            return Err(Error::format(format!(
                "Band '{}' has {} values, expected {}x{}",
                name,
                data.len(),
                self.width,
                self.height
            )));
        }
        match self.band_names.iter().position(|n| n == name) {
            Some(idx) => self.bands[idx] = data,
            None => {
                self.band_names.push(name.to_string());
                self.bands.push(data);
            }
        }
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn band(&self, name: &str) -> Option<&[f64]> {
        self.band_names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.bands[idx].as_slice())
    }

    /// Same as [`Raster::band`] but missing bands are a computation error.
    pub fn require_band(&self, name: &str) -> Result<&[f64]> {
        self.band(name).ok_or_else(|| {
            Error::computation(format!(
                "Band '{}' not found (available: {:?})",
                name, self.band_names
            ))
        })
    }

    /// Pixel size in degrees as (dx, dy)
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.bbox.width() / self.width as f64,
            self.bbox.height() / self.height as f64,
        )
    }

    /// Row/column of the pixel covering (lon, lat), if inside the raster.
    pub fn pixel_at(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 || !self.bbox.contains(lon, lat) {
            return None;
        }
        let (dx, dy) = self.pixel_size();
        let col = (((lon - self.bbox.min_x) / dx) as usize).min(self.width - 1);
        let row = (((self.bbox.max_y - lat) / dy) as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Nearest-pixel value of a band at (lon, lat); `None` outside or on no-data.
    pub fn value_at(&self, band: &[f64], lon: f64, lat: f64) -> Option<f64> {
        let (row, col) = self.pixel_at(lon, lat)?;
        let value = band[row * self.width + col];
        (!value.is_nan()).then_some(value)
    }

    /// Min and max of the valid values of a band
    pub fn value_range(&self, name: &str) -> Option<(f64, f64)> {
        self.band(name)?
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Decode a GeoTIFF held in memory.
    ///
    /// Georeferencing comes from the ModelPixelScale and ModelTiepoint tags and
    /// the GDAL no-data tag when present. Samples must be interleaved (chunky).
    /// Bands are named after `band_names`; extra samples get `band_<n>` names.
    pub fn from_geotiff_bytes(bytes: &[u8], band_names: &[&str]) -> Result<Self> {
        Self::from_tiff_bytes(bytes, band_names, None)
    }

    /// Like [`Raster::from_geotiff_bytes`], placing an image without
    /// georeferencing tags on `extent` (a WMS answer covers the requested bbox).
    pub fn from_tiff_bytes(
        bytes: &[u8],
        band_names: &[&str],
        extent: Option<BoundingBox>,
    ) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(bytes))
            .map_err(|e| Error::format(format!("Failed to read TIFF: {}", e)))?;

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| Error::format(format!("Failed to read TIFF dimensions: {}", e)))?;
        let (width, height) = (width as usize, height as usize);

        let samples = match decoder
            .colortype()
            .map_err(|e| Error::format(format!("Failed to read TIFF color type: {}", e)))?
        {
            ColorType::Gray(_) => 1,
            ColorType::GrayA(_) => 2,
            ColorType::RGB(_) => 3,
            ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
            other => {
                return Err(Error::format(format!(
                    "Unsupported TIFF color type: {:?}",
                    other
                )))
            }
        };

        let bbox = match (read_geo_extent(&mut decoder, width, height), extent) {
            (Some(bbox), _) | (None, Some(bbox)) => bbox,
            (None, None) => {
                return Err(Error::format(
                    "TIFF carries no ModelPixelScale/ModelTiepoint georeferencing",
                ))
            }
        };
        let no_data = read_no_data(&mut decoder);

        let image = decoder
            .read_image()
            .map_err(|e| Error::format(format!("Failed to decode TIFF pixels: {}", e)))?;
        let values = decoding_to_f64(image)?;

        if values.len() != width * height * samples {
            return Err(Error::format(format!(
                "TIFF holds {} samples, expected {}x{}x{}",
                values.len(),
                width,
                height,
                samples
            )));
        }

        debug!(width, height, samples, ?bbox, "Decoded GeoTIFF");

        let mut raster = Raster::new(width, height, bbox);
        for s in 0..samples {
            let data: Vec<f64> = values
                .iter()
                .skip(s)
                .step_by(samples)
                .map(|&v| match no_data {
                    Some(nd) if v == nd => f64::NAN,
                    _ => v,
                })
                .collect();
            let name = band_names
                .get(s)
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("band_{}", s + 1));
            raster = raster.with_band(&name, data)?;
        }
        Ok(raster)
    }
}

fn read_geo_extent<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> Option<BoundingBox> {
    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok());
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok());

    match (scale, tiepoint) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            let min_x = tie[3] - tie[0] * sx;
            let max_y = tie[4] + tie[1] * sy;
            Some(BoundingBox::new(
                min_x,
                max_y - height as f64 * sy,
                min_x + width as f64 * sx,
                max_y,
            ))
        }
        _ => None,
    }
}

fn read_no_data<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .find_tag(Tag::GdalNodata)
        .ok()
        .flatten()
        .and_then(|v| v.into_string().ok())
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok())
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return Err(Error::format("Unsupported TIFF sample format")),
    };
    Ok(values)
}

/// Area-weighted sum of a layer over a region, in square metres.
///
/// The region's bounding box is sampled on a grid of `scale_m` metres; each
/// sample whose centre falls inside the region contributes
/// `weight * scale_m²`. Fails when the grid would exceed `max_pixels` samples.
/// Returns `None` when no sample produced a value.
pub fn reduce_area(
    layer: Layer<'_>,
    region: &MultiPolygon<f64>,
    scale_m: f64,
    max_pixels: u64,
) -> Result<Option<f64>> {
    if !(scale_m.is_finite() && scale_m > 0.0) {
        return Err(Error::computation(format!("Invalid scale: {}", scale_m)));
    }
    let Some(rect) = region.bounding_rect() else {
        return Ok(None);
    };
    let bbox = BoundingBox::from(rect);

    let dx = meters_to_deg_lon(scale_m);
    let dy = meters_to_deg_lat(scale_m);
    let cols = (bbox.width() / dx).ceil() as u64;
    let rows = (bbox.height() / dy).ceil() as u64;
    let pixels = cols.saturating_mul(rows);
    if pixels > max_pixels {
        return Err(Error::computation(format!(
            "Region requires {} pixels at scale {} m, above max_pixels {}",
            pixels, scale_m, max_pixels
        )));
    }

    let band = match layer {
        Layer::PixelArea => None,
        Layer::Band { raster, band } => Some((raster, raster.require_band(band)?)),
    };

    let pixel_area = scale_m * scale_m;
    let mut sum = 0.0;
    let mut sampled = false;
    for row in 0..rows {
        let lat = bbox.min_y + (row as f64 + 0.5) * dy;
        for col in 0..cols {
            let lon = bbox.min_x + (col as f64 + 0.5) * dx;
            if !region.contains(&Point::new(lon, lat)) {
                continue;
            }
            let weight = match band {
                None => Some(1.0),
                Some((raster, data)) => raster.value_at(data, lon, lat),
            };
            if let Some(w) = weight {
                sum += w * pixel_area;
                sampled = true;
            }
        }
    }

    Ok(sampled.then_some(sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn square(side: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: side, y: 0.0),
            (x: side, y: side),
            (x: 0.0, y: side),
        ]])
    }

    fn half_raster() -> Raster {
        // Left column 1.0, right column 0.0
        Raster::new(2, 1, BoundingBox::new(0.0, 0.0, 0.002, 0.001))
            .with_band("mask", vec![1.0, 0.0])
            .unwrap()
    }

    #[test]
    fn test_with_band_checks_length() {
        let raster = Raster::new(2, 2, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(raster.with_band("nir", vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let raster = half_raster();
        let band = raster.band("mask").unwrap();
        assert_eq!(raster.value_at(band, 0.0005, 0.0005), Some(1.0));
        assert_eq!(raster.value_at(band, 0.0015, 0.0005), Some(0.0));
        assert_eq!(raster.value_at(band, 0.5, 0.5), None);
        assert_eq!(raster.value_range("mask"), Some((0.0, 1.0)));
    }

    #[test]
    fn test_reduce_pixel_area() {
        // 0.001 deg of latitude ~ 110.54 m, longitude ~ 111.32 m
        let area = reduce_area(Layer::PixelArea, &square(0.001), 10.0, 1_000_000)
            .unwrap()
            .unwrap();
        // 12 x 12 samples of 100 m² cover the square's bbox
        assert!(area > 11_000.0 && area <= 14_400.0, "area = {}", area);
    }

    #[test]
    fn test_reduce_band_weights() {
        let raster = half_raster();
        let region = MultiPolygon::new(vec![raster.bbox().to_polygon()]);
        let total = reduce_area(Layer::PixelArea, &region, 10.0, 1_000_000)
            .unwrap()
            .unwrap();
        let masked = reduce_area(
            Layer::Band {
                raster: &raster,
                band: "mask",
            },
            &region,
            10.0,
            1_000_000,
        )
        .unwrap()
        .unwrap();
        let ratio = masked / total;
        assert!((ratio - 0.5).abs() < 0.1, "ratio = {}", ratio);
    }

    #[test]
    fn test_reduce_pixel_ceiling() {
        let result = reduce_area(Layer::PixelArea, &square(1.0), 10.0, 1000);
        assert!(matches!(result, Err(Error::Computation(_))));
    }

    #[test]
    fn test_reduce_empty_region() {
        let empty: MultiPolygon<f64> = MultiPolygon::new(vec![]);
        assert_eq!(
            reduce_area(Layer::PixelArea, &empty, 10.0, 1000).unwrap(),
            None
        );
    }

    #[test]
    fn test_reduce_missing_band() {
        let raster = half_raster();
        let result = reduce_area(
            Layer::Band {
                raster: &raster,
                band: "ndvi",
            },
            &square(0.001),
            10.0,
            1_000_000,
        );
        assert!(matches!(result, Err(Error::Computation(_))));
    }

    #[test]
    fn test_decode_invalid_tiff() {
        assert!(matches!(
            Raster::from_geotiff_bytes(b"not a tiff", &["nir"]),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_decode_gdal_nodata() {
        use tiff::encoder::{colortype, TiffEncoder};

        let data: Vec<f32> = vec![1.0, -9999.0, 2.0, 3.0];
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder.new_image::<colortype::Gray32Float>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, &[1.0f64, 1.0, 0.0][..])
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, 10.0, 20.0, 0.0][..])
                .unwrap();
            image.encoder().write_tag(Tag::GdalNodata, "-9999").unwrap();
            image.write_data(&data).unwrap();
        }

        let raster = Raster::from_geotiff_bytes(&buf.into_inner(), &["value"]).unwrap();
        assert_eq!(raster.bbox(), BoundingBox::new(10.0, 18.0, 12.0, 20.0));
        let band = raster.band("value").unwrap();
        assert!(band[1].is_nan());
        assert_eq!(raster.value_range("value"), Some((1.0, 3.0)));
    }
}
