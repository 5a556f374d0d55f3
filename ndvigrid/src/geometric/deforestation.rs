use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use crate::collect::global_variables::get_temp_path;
use crate::collect::{fetch_bytes, http_client};
use crate::error::{Error, Result};
use crate::geo_core::BoundingBox;
use crate::raster::Raster;

pub const BAND_DEFORESTATION: &str = "deforestation";

/// Where the deforestation GeoTIFF lives
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSource {
    Url(String),
    Path(PathBuf),
}

impl RasterSource {
    /// http(s) URLs are downloaded, anything else is a local path
    pub fn parse(source: &str) -> Self {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                RasterSource::Url(source.to_string())
            }
            _ => RasterSource::Path(PathBuf::from(source)),
        }
    }
}

/// Raster overlay positioned by its geographic bounds
#[derive(Debug, Clone)]
pub struct RasterOverlay {
    pub bounds: BoundingBox,
    /// Map centre as (lat, lon)
    pub center: (f64, f64),
    pub zoom: u8,
    pub opacity: f64,
    pub raster: Raster,
}

impl RasterOverlay {
    pub fn new(raster: Raster) -> Self {
        let bounds = raster.bbox();
        let (lon, lat) = bounds.center();
        RasterOverlay {
            bounds,
            center: (lat, lon),
            zoom: 8,
            opacity: 0.6,
            raster,
        }
    }
}

/// Deforestation raster loader
pub struct Deforestation {
    source: RasterSource,
    /// Where downloaded rasters are kept
    cache_dir: PathBuf,
}

impl Deforestation {
    pub fn new(source: RasterSource) -> Self {
        Deforestation {
            source,
            cache_dir: get_temp_path(),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: &Path) -> Self {
        self.cache_dir = cache_dir.to_path_buf();
        self
    }

    pub fn source(&self) -> &RasterSource {
        &self.source
    }

    /// Read the first band of the raster
    pub fn load(&self) -> Result<Raster> {
        let bytes = match &self.source {
            RasterSource::Url(url) => {
                let client = http_client(300)?;
                let bytes = fetch_bytes(&client, url)?;
                self.cache(&bytes)?;
                bytes
            }
            RasterSource::Path(path) => std::fs::read(path).map_err(|e| {
                Error::fetch(format!("Failed to open raster {:?}: {}", path, e))
            })?,
        };

        let raster = Raster::from_geotiff_bytes(&bytes, &[BAND_DEFORESTATION])?;
        info!(
            width = raster.width(),
            height = raster.height(),
            bounds = ?raster.bbox(),
            "Deforestation raster loaded"
        );
        Ok(raster)
    }

    pub fn overlay(&self) -> Result<RasterOverlay> {
        Ok(RasterOverlay::new(self.load()?))
    }

    fn cache(&self, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_dir.join("deforestation.tif");
        std::fs::write(&path, bytes)?;
        info!(path = %path.display(), "Raster cached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parse() {
        assert_eq!(
            RasterSource::parse("https://example.org/desmatamento.tif"),
            RasterSource::Url("https://example.org/desmatamento.tif".to_string())
        );
        assert_eq!(
            RasterSource::parse("data/desmatamento.tif"),
            RasterSource::Path(PathBuf::from("data/desmatamento.tif"))
        );
        assert!(matches!(
            RasterSource::parse("C:/rasters/a.tif"),
            RasterSource::Path(_)
        ));
    }

    #[test]
    fn test_overlay_position() {
        let raster = Raster::new(2, 2, BoundingBox::new(-63.0, -12.0, -61.0, -11.0))
            .with_band(BAND_DEFORESTATION, vec![0.0, 1.0, 1.0, 0.0])
            .unwrap();
        let overlay = RasterOverlay::new(raster);
        assert_eq!(overlay.center, (-11.5, -62.0));
        assert_eq!(overlay.zoom, 8);
        assert_eq!(
            overlay.bounds.to_leaflet_bounds(),
            [[-12.0, -63.0], [-11.0, -61.0]]
        );
    }

    #[test]
    fn test_missing_file() {
        let loader = Deforestation::new(RasterSource::Path(PathBuf::from(
            "/nonexistent/desmatamento.tif",
        )));
        assert!(matches!(loader.load(), Err(Error::Fetch(_))));
    }
}
