use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use std::path::PathBuf;
use tracing::info;

use ndvigrid::collect::ibge::IbgeCollect;
use ndvigrid::collect::imagery::{DateRange, ImageryBackend};
use ndvigrid::collect::synthetic::SyntheticImagery;
use ndvigrid::collect::wms::WmsImagery;
use ndvigrid::config::AppConfig;
use ndvigrid::dashboard::{run_deforestation, Session};
use ndvigrid::geo_core::BoundingBox;
use ndvigrid::geometric::boundary::load_polygon;
use ndvigrid::geometric::deforestation::{Deforestation, RasterSource};
use ndvigrid::render::{
    municipality_table, results_table, write_deforestation_map, write_polygon_map, write_results,
};

use crate::output::OutputWriter;

#[derive(Subcommand)]
pub enum Commands {
    /// Deforestation raster map and municipality preview
    Deforestation {
        /// GeoTIFF URL or path (default: config `deforestation.tif_url`)
        #[arg(long)]
        tif_url: Option<String>,

        /// IBGE municipality code (7 digits) or state code (2 digits)
        #[arg(long)]
        code_muni: Option<u32>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Vegetation percentage (NDVI) per grid cell
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    /// GeoJSON polygon file
    #[arg(short, long)]
    pub polygon: PathBuf,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Inclusive end date (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Cell width in metres
    #[arg(long)]
    pub cell_width: Option<f64>,

    /// Cell height in metres
    #[arg(long)]
    pub cell_height: Option<f64>,

    /// Use synthetic imagery instead of the WMS service
    #[arg(long)]
    pub offline: bool,

    /// Sentinel Hub instance id (default: config `wms.instance_id`)
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn cmd_deforestation(
    config: &AppConfig,
    tif_url: Option<String>,
    code_muni: Option<u32>,
    output: Option<PathBuf>,
    out: &OutputWriter,
) -> Result<()> {
    let source = tif_url.unwrap_or_else(|| config.deforestation.tif_url.clone());
    let code = code_muni.unwrap_or(config.deforestation.municipality_code);
    let output_dir = output.unwrap_or_else(|| config.analysis.output_dir.clone());

    out.header("Dashboard de Desmatamento");
    info!(source = %source, code, "Loading deforestation dashboard");

    let loader = Deforestation::new(RasterSource::parse(&source));
    let ibge = IbgeCollect::new().context("Failed to build IBGE client")?;
    let view = run_deforestation(&loader, &ibge, code, config.deforestation.preview_rows);

    for banner in &view.banners {
        out.banner(banner);
    }

    if let Some(overlay) = &view.overlay {
        let path = write_deforestation_map(overlay, &output_dir)
            .with_context(|| format!("Failed to write map to {:?}", output_dir))?;
        out.success(format!("Mapa gerado: {}", path.display()));
    }

    if !view.municipalities.is_empty() {
        out.info(format!("Municípios ({})", code));
        out.table(&municipality_table(&view.municipalities));
    }

    Ok(())
}

pub fn cmd_analyze(config: &AppConfig, args: AnalyzeArgs, out: &OutputWriter) -> Result<()> {
    let mut analysis = config.analysis.clone();
    if let Some(width) = args.cell_width {
        analysis.cell_width_m = width;
    }
    if let Some(height) = args.cell_height {
        analysis.cell_height_m = height;
    }
    let output_dir = args.output.unwrap_or_else(|| analysis.output_dir.clone());
    let dates = DateRange::new(args.start, args.end).context("Invalid date range")?;

    let polygon = load_polygon(&args.polygon)
        .with_context(|| format!("Failed to load polygon {:?}", args.polygon))?;

    let backend: Box<dyn ImageryBackend> = if args.offline {
        // Vegetated west half, bare east half
        let split = BoundingBox::from_polygon(&polygon)
            .map(|b| b.center().0)
            .unwrap_or(0.0);
        Box::new(SyntheticImagery::split(split))
    } else {
        let mut wms = config.wms.clone();
        if args.instance_id.is_some() {
            wms.instance_id = args.instance_id.clone();
        }
        Box::new(WmsImagery::new(wms).context("Failed to build WMS client")?)
    };

    out.header("Análise de Vegetação por Grade");
    out.kv("Fonte", backend.name());
    out.kv("Período", dates.to_time_param());
    out.kv(
        "Grade",
        format!("{} m x {} m", analysis.cell_width_m, analysis.cell_height_m),
    );

    let mut session = Session::new(backend, analysis);
    session.start()?;
    session.upload_polygon(polygon.clone())?;

    let map = write_polygon_map(&polygon, &output_dir)?;
    out.success(format!("Polígono carregado: {}", map.display()));

    let processed = session.process(dates).map(|_| ());
    for banner in session.take_banners() {
        out.banner(&banner);
    }
    processed.context("Processing failed")?;

    let Some(results) = session.results() else {
        bail!("Processing produced no results");
    };
    let files = write_results(results, &polygon, &output_dir)?;

    out.success(format!(
        "Vegetação no polígono: {:.2}%",
        results.overall.percentage
    ));
    out.table(&results_table(results));
    out.success(format!("Mapa de resultados: {}", files.map.display()));
    out.success(format!("Tabela: {}", files.csv.display()));

    Ok(())
}
