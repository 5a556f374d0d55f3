use geo::{MultiPolygon, Polygon};
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::collect::ibge::{MunicipalityRow, MunicipalitySource};
use crate::collect::imagery::{CompositeRequest, DateRange, ImageryBackend, ImageryFrame};
use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::geo_core::BoundingBox;
use crate::geometric::boundary::{load_polygon, parse_polygon};
use crate::geometric::deforestation::{Deforestation, RasterOverlay};
use crate::geometric::grid::{generate_grid, GridCell};
use crate::geometric::vegetation::{
    compute_region_stats, compute_stats, VegetationMask, VegetationStats,
};

/// Cells above this vegetation percentage are drawn green
pub const GREEN_THRESHOLD_PERCENT: f64 = 50.0;
pub const COLOR_VEGETATED: &str = "#2ecc71";
pub const COLOR_SPARSE: &str = "#e74c3c";

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// User-visible message
#[derive(Debug, Clone, PartialEq)]
pub enum Banner {
    Info(String),
    Warning(String),
    Error(String),
}

impl Banner {
    fn log(&self) {
        match self {
            Banner::Info(msg) => info!("{}", msg),
            Banner::Warning(msg) => warn!("{}", msg),
            Banner::Error(msg) => error!("{}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingUpload,
    PolygonLoaded,
    Processing,
    Results,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingUpload => "AwaitingUpload",
            SessionState::PolygonLoaded => "PolygonLoaded",
            SessionState::Processing => "Processing",
            SessionState::Results => "Results",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Statistics of one grid cell; `index` is 1-based
#[derive(Debug, Clone)]
pub struct CellResult {
    pub index: usize,
    pub cell: GridCell,
    pub stats: VegetationStats,
}

impl CellResult {
    pub fn color(&self) -> &'static str {
        if self.stats.percentage > GREEN_THRESHOLD_PERCENT {
            COLOR_VEGETATED
        } else {
            COLOR_SPARSE
        }
    }
}

/// Output of one processing run
#[derive(Debug, Clone)]
pub struct AnalysisResults {
    pub dates: DateRange,
    pub overall: VegetationStats,
    pub cells: Vec<CellResult>,
    pub frame: ImageryFrame,
    pub mask: VegetationMask,
}

/// Fetch imagery, tile the polygon and compute whole-polygon and per-cell
/// vegetation statistics. Cells are processed one after the other.
pub fn run_analysis<B: ImageryBackend + ?Sized>(
    backend: &B,
    polygon: &Polygon<f64>,
    dates: DateRange,
    config: &AnalysisConfig,
) -> Result<AnalysisResults> {
    let bbox = BoundingBox::from_polygon(polygon)
        .ok_or_else(|| Error::format("Boundary polygon is empty"))?;
    let request = CompositeRequest {
        bbox,
        dates,
        max_cloud_cover: config.max_cloud_cover,
    };
    info!(
        backend = backend.name(),
        dates = %dates.to_time_param(),
        "Fetching composite"
    );
    let frame = backend.fetch_composite(&request)?;

    let cells = generate_grid(polygon, config.cell_width_m, config.cell_height_m)?;
    info!(cells = cells.len(), "Grid generated");

    let whole = MultiPolygon::new(vec![polygon.clone()]);
    let (mask, overall) = compute_stats(backend, &frame, &whole, config.max_pixels)?;
    info!(percentage = overall.percentage, "Whole polygon reduced");

    #[cfg(feature = "indicatif")]
    let pb = {
        let pb = ProgressBar::new(cells.len() as u64);
        pb.set_style(progress_style());
        pb.set_message("Cells");
        pb
    };

    let mut results = Vec::with_capacity(cells.len());
    for (idx, cell) in cells.into_iter().enumerate() {
        let region = cell.clip(polygon);
        let stats = compute_region_stats(backend, &mask, &region, config.max_pixels)?;
        results.push(CellResult {
            index: idx + 1,
            cell,
            stats,
        });
        #[cfg(feature = "indicatif")]
        pb.inc(1);
    }

    #[cfg(feature = "indicatif")]
    pb.finish_and_clear();

    Ok(AnalysisResults {
        dates,
        overall,
        cells: results,
        frame,
        mask,
    })
}

/// Grid vegetation dashboard session.
///
/// Idle → AwaitingUpload → PolygonLoaded → Processing → Results. A failed
/// run falls back to PolygonLoaded with an error banner and can be retried.
pub struct Session<B: ImageryBackend> {
    backend: B,
    config: AnalysisConfig,
    state: SessionState,
    polygon: Option<Polygon<f64>>,
    results: Option<AnalysisResults>,
    banners: Vec<Banner>,
}

impl<B: ImageryBackend> Session<B> {
    pub fn new(backend: B, config: AnalysisConfig) -> Self {
        Session {
            backend,
            config,
            state: SessionState::Idle,
            polygon: None,
            results: None,
            banners: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn polygon(&self) -> Option<&Polygon<f64>> {
        self.polygon.as_ref()
    }

    pub fn results(&self) -> Option<&AnalysisResults> {
        self.results.as_ref()
    }

    pub fn banners(&self) -> &[Banner] {
        &self.banners
    }

    /// Drain the banners shown so far
    pub fn take_banners(&mut self) -> Vec<Banner> {
        std::mem::take(&mut self.banners)
    }

    fn push_banner(&mut self, banner: Banner) {
        banner.log();
        self.banners.push(banner);
    }

    fn expect_state(&self, allowed: &[SessionState], expected: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected,
                actual: self.state.name(),
            })
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state(&[SessionState::Idle], "Idle")?;
        self.state = SessionState::AwaitingUpload;
        Ok(())
    }

    pub fn upload_file(&mut self, path: &Path) -> Result<()> {
        self.expect_upload()?;
        let loaded = load_polygon(path);
        self.accept_polygon(loaded)
    }

    pub fn upload_str(&mut self, content: &str) -> Result<()> {
        self.expect_upload()?;
        let parsed = parse_polygon(content);
        self.accept_polygon(parsed)
    }

    /// Accept a polygon the caller already loaded
    pub fn upload_polygon(&mut self, polygon: Polygon<f64>) -> Result<()> {
        self.expect_upload()?;
        self.accept_polygon(Ok(polygon))
    }

    fn expect_upload(&self) -> Result<()> {
        self.expect_state(
            &[
                SessionState::AwaitingUpload,
                SessionState::PolygonLoaded,
                SessionState::Results,
            ],
            "AwaitingUpload",
        )
    }

    fn accept_polygon(&mut self, polygon: Result<Polygon<f64>>) -> Result<()> {
        match polygon {
            Ok(polygon) => {
                self.polygon = Some(polygon);
                self.results = None;
                self.state = SessionState::PolygonLoaded;
                Ok(())
            }
            Err(err) => {
                self.push_banner(Banner::Error(format!(
                    "Erro ao carregar o polígono: {}",
                    err
                )));
                Err(err)
            }
        }
    }

    /// Run the analysis for `dates` on the loaded polygon.
    pub fn process(&mut self, dates: DateRange) -> Result<&AnalysisResults> {
        self.expect_state(
            &[SessionState::PolygonLoaded, SessionState::Results],
            "PolygonLoaded",
        )?;
        let polygon = self.polygon.clone().ok_or(Error::InvalidState {
            expected: "PolygonLoaded",
            actual: self.state.name(),
        })?;

        self.results = None;
        self.state = SessionState::Processing;
        self.push_banner(Banner::Info(
            "Processando imagens e calculando NDVI...".to_string(),
        ));

        match run_analysis(&self.backend, &polygon, dates, &self.config) {
            Ok(results) => {
                self.state = SessionState::Results;
                Ok(&*self.results.insert(results))
            }
            Err(err) => {
                self.state = SessionState::PolygonLoaded;
                self.push_banner(Banner::Error(format!("Erro no processamento: {}", err)));
                Err(err)
            }
        }
    }
}

/// Everything the deforestation dashboard shows
#[derive(Debug, Clone)]
pub struct DeforestationView {
    pub overlay: Option<RasterOverlay>,
    pub municipalities: Vec<MunicipalityRow>,
    pub banners: Vec<Banner>,
}

/// Load the deforestation overlay and the municipality preview.
///
/// Neither failure is fatal: a raster error becomes an error banner, a
/// municipality error a warning banner.
pub fn run_deforestation<M: MunicipalitySource + ?Sized>(
    loader: &Deforestation,
    municipalities: &M,
    municipality_code: u32,
    preview_rows: usize,
) -> DeforestationView {
    let mut banners = Vec::new();

    let overlay = match loader.overlay() {
        Ok(overlay) => Some(overlay),
        Err(err) => {
            banners.push(Banner::Error(format!("Erro ao carregar o TIF: {}", err)));
            None
        }
    };

    let rows = match municipalities.read_municipality(municipality_code) {
        Ok(mut rows) => {
            rows.truncate(preview_rows);
            rows
        }
        Err(err) => {
            banners.push(Banner::Warning(format!(
                "Não foi possível carregar os municípios: {}",
                err
            )));
            Vec::new()
        }
    };

    for banner in &banners {
        banner.log();
    }

    DeforestationView {
        overlay,
        municipalities: rows,
        banners,
    }
}
