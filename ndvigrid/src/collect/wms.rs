use reqwest::blocking::Client;
use tracing::info;

use crate::collect::imagery::{CompositeRequest, ImageryBackend, ImageryFrame};
use crate::collect::{fetch_bytes, http_client};
use crate::config::WmsConfig;
use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, EPSG_WGS84, METERS_PER_DEG_LAT, METERS_PER_DEG_LON};
use crate::raster::Raster;

/// Imagery backend over an OGC WMS 1.3.0 GetMap endpoint returning TIFF.
///
/// The layer must have a time dimension (Sentinel Hub TIME); cloud cover is
/// sent when the service names a parameter for it.
pub struct WmsImagery {
    client: Client,
    endpoint: String,
    config: WmsConfig,
}

impl WmsImagery {
    /// Fails with a configuration error when the layer cannot filter by date
    /// or the endpoint misses its instance id.
    pub fn new(config: WmsConfig) -> Result<Self> {
        if config.time_param.is_none() {
            return Err(Error::Config(format!(
                "WMS layer {} has no time parameter, the requested dates cannot be honoured",
                config.layer
            )));
        }
        let endpoint = config.endpoint()?;
        let client = http_client(config.timeout_secs)?;
        Ok(WmsImagery {
            client,
            endpoint,
            config,
        })
    }

    /// Image size in pixels for the configured resolution, clamped to
    /// `1..=max_size_px` on each axis.
    pub fn image_size(&self, bbox: &BoundingBox) -> (u32, u32) {
        let width_m = bbox.width() * METERS_PER_DEG_LON;
        let height_m = bbox.height() * METERS_PER_DEG_LAT;
        let clamp = |px: f64| (px.ceil() as u32).clamp(1, self.config.max_size_px.max(1));
        (
            clamp(width_m / self.config.resolution_m),
            clamp(height_m / self.config.resolution_m),
        )
    }

    /// GetMap request URL.
    /// WMS 1.3.0 with EPSG:4326 expects the bbox in lat/lon axis order.
    pub fn build_getmap_url(&self, request: &CompositeRequest) -> String {
        let bbox = &request.bbox;
        let (width_px, height_px) = self.image_size(bbox);
        let bbox_str = format!(
            "{},{},{},{}",
            bbox.min_y, bbox.min_x, bbox.max_y, bbox.max_x
        );
        let base_url = if self.endpoint.contains('?') {
            format!("{}&", self.endpoint)
        } else {
            format!("{}?", self.endpoint)
        };

        let mut url = format!(
            "{}SERVICE=WMS&VERSION=1.3.0&REQUEST=GetMap&LAYERS={}&STYLES=&CRS=EPSG:{}&BBOX={}&WIDTH={}&HEIGHT={}&FORMAT={}",
            base_url,
            urlencoding::encode(&self.config.layer),
            EPSG_WGS84,
            bbox_str,
            width_px,
            height_px,
            urlencoding::encode(&self.config.format)
        );
        if let Some(ref param) = self.config.time_param {
            url.push_str(&format!(
                "&{}={}",
                param,
                urlencoding::encode(&request.dates.to_time_param())
            ));
        }
        if let Some(ref param) = self.config.cloud_param {
            url.push_str(&format!("&{}={}", param, request.max_cloud_cover));
        }
        url
    }
}

/// Turn a GetMap body into a frame.
///
/// Services answer errors with an XML exception report and a 200 status. An
/// image without georeferencing tags is placed on the requested bbox.
pub fn decode_response(
    bytes: &[u8],
    request: &CompositeRequest,
    band_names: &[&str],
) -> Result<ImageryFrame> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]);
    let head = head.trim_start();
    if head.starts_with("<?xml") || head.starts_with("<ServiceExceptionReport") {
        let text = String::from_utf8_lossy(bytes);
        return Err(Error::fetch(format!(
            "WMS service exception: {}",
            text.chars().take(300).collect::<String>()
        )));
    }

    let raster = Raster::from_tiff_bytes(bytes, band_names, Some(request.bbox))?;
    info!(
        width = raster.width(),
        height = raster.height(),
        bands = ?raster.band_names(),
        "WMS composite decoded"
    );
    ImageryFrame::new(raster, request.clone())
}

impl ImageryBackend for WmsImagery {
    fn fetch_composite(&self, request: &CompositeRequest) -> Result<ImageryFrame> {
        let url = self.build_getmap_url(request);
        info!(%url, "Requesting WMS composite");

        let bytes = fetch_bytes(&self.client, &url)?;
        let names: Vec<&str> = self.config.bands.iter().map(String::as_str).collect();
        decode_response(&bytes, request, &names)
    }

    fn name(&self) -> &str {
        "wms"
    }
}
