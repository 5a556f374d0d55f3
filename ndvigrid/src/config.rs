use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::imagery::{BAND_NIR, BAND_RED};
use crate::error::{Error, Result};
use crate::geometric::grid::{DEFAULT_CELL_HEIGHT_M, DEFAULT_CELL_WIDTH_M};

/// Default deforestation raster (GeoTIFF download link)
pub const DEFAULT_TIF_URL: &str =
    "https://drive.google.com/uc?export=download&id=1ElNwj-3RWUyUazCth2kiRMiyuKDVHR1C";

/// IBGE code of Alta Floresta D'Oeste (RO)
pub const DEFAULT_MUNICIPALITY_CODE: u32 = 1100015;

/// Settings file, every section optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub wms: WmsConfig,
    pub deforestation: DeforestationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub cell_width_m: f64,
    pub cell_height_m: f64,
    /// Ceiling on the samples a single reduction may visit
    pub max_pixels: u64,
    /// Maximum scene cloud cover, in percent
    pub max_cloud_cover: f64,
    pub output_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            cell_width_m: DEFAULT_CELL_WIDTH_M,
            cell_height_m: DEFAULT_CELL_HEIGHT_M,
            max_pixels: 100_000_000,
            max_cloud_cover: 20.0,
            output_dir: PathBuf::from("./output"),
        }
    }
}

/// Sentinel Hub OGC endpoint; `{instance_id}` is filled from `wms.instance_id`
pub const SENTINEL_HUB_WMS_URL: &str = "https://services.sentinel-hub.com/ogc/wms/{instance_id}";

/// WMS GetMap imagery source.
///
/// Defaults to Sentinel-2 through Sentinel Hub, which honours the TIME and
/// MAXCC parameters. The configuration instance must expose `layer` returning
/// B08, B04 and B03 as float samples.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WmsConfig {
    /// Endpoint, may contain an `{instance_id}` placeholder
    pub url: String,
    pub instance_id: Option<String>,
    pub layer: String,
    /// GetMap FORMAT value
    pub format: String,
    /// Names of the GeoTIFF samples, in order
    pub bands: Vec<String>,
    /// Requested ground resolution, metres per pixel
    pub resolution_m: f64,
    /// Upper bound on the requested image width and height
    pub max_size_px: u32,
    /// Query parameter carrying `start/end`; a layer without one is refused
    pub time_param: Option<String>,
    /// Query parameter carrying the maximum cloud cover, when supported
    pub cloud_param: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WmsConfig {
    fn default() -> Self {
        WmsConfig {
            url: SENTINEL_HUB_WMS_URL.to_string(),
            instance_id: None,
            layer: "NIR_RED_GREEN".to_string(),
            format: "image/tiff;depth=32f".to_string(),
            bands: vec!["nir".to_string(), "red".to_string(), "green".to_string()],
            resolution_m: 10.0,
            max_size_px: 2500,
            time_param: Some("TIME".to_string()),
            cloud_param: Some("MAXCC".to_string()),
            timeout_secs: 120,
        }
    }
}

impl WmsConfig {
    /// Endpoint with the instance id filled in
    pub fn endpoint(&self) -> Result<String> {
        if !self.url.contains("{instance_id}") {
            return Ok(self.url.clone());
        }
        match self.instance_id.as_deref() {
            Some(id) if !id.trim().is_empty() => {
                Ok(self.url.replace("{instance_id}", id.trim()))
            }
            _ => Err(Error::Config(format!(
                "wms.instance_id is required by {}",
                self.url
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeforestationConfig {
    /// URL or local path of the deforestation GeoTIFF
    pub tif_url: String,
    pub municipality_code: u32,
    /// Rows shown in the municipality preview table
    pub preview_rows: usize,
}

impl Default for DeforestationConfig {
    fn default() -> Self {
        DeforestationConfig {
            tif_url: DEFAULT_TIF_URL.to_string(),
            municipality_code: DEFAULT_MUNICIPALITY_CODE,
            preview_rows: 5,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(AppConfig::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        for (key, value) in [
            ("analysis.cell_width_m", a.cell_width_m),
            ("analysis.cell_height_m", a.cell_height_m),
            ("wms.resolution_m", self.wms.resolution_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "{} must be a positive number, got {}",
                    key, value
                )));
            }
        }
        if !(0.0..=100.0).contains(&a.max_cloud_cover) {
            return Err(Error::Config(format!(
                "analysis.max_cloud_cover must be within 0..=100, got {}",
                a.max_cloud_cover
            )));
        }
        if self.wms.time_param.is_none() {
            return Err(Error::Config(format!(
                "wms.time_param is not set: layer {} cannot filter by date",
                self.wms.layer
            )));
        }
        for band in [BAND_NIR, BAND_RED] {
            if !self.wms.bands.iter().any(|b| b == band) {
                return Err(Error::Config(format!(
                    "wms.bands must name a '{}' band, got {:?}",
                    band, self.wms.bands
                )));
            }
        }
        Ok(())
    }
}
