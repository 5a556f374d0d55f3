use geo::Polygon;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use image::{Rgba, RgbaImage};
use serde::Serialize;
use serde_json::{json, Map};
use std::fs;
use std::path::{Path, PathBuf};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::info;

use crate::collect::ibge::MunicipalityRow;
use crate::collect::imagery::{BAND_GREEN, BAND_NIR, BAND_RED};
use crate::dashboard::AnalysisResults;
use crate::error::{Error, Result};
use crate::geo_core::BoundingBox;
use crate::geometric::deforestation::{RasterOverlay, BAND_DEFORESTATION};
use crate::geometric::vegetation::BAND_VEGETATION;
use crate::raster::Raster;

const LEAFLET_VERSION: &str = "1.9.4";

/// How raster values become pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Yellow to red ramp over the deforestation band, zero transparent
    Deforestation,
    /// Green where the vegetation band is 1
    Vegetation,
    /// NIR, red and green bands as R, G and B
    FalseColor,
}

/// Row of the results table and CSV
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct CellRow {
    #[tabled(rename = "Grade")]
    #[serde(rename = "Grade")]
    pub grade: usize,
    #[tabled(rename = "Porcentagem de Vegetação (%)", display_with = "display_percentage")]
    #[serde(rename = "Porcentagem de Vegetação (%)")]
    pub percentage: f64,
}

fn display_percentage(value: &f64) -> String {
    format!("{:.2}", value)
}

pub fn cell_rows(results: &AnalysisResults) -> Vec<CellRow> {
    results
        .cells
        .iter()
        .map(|c| CellRow {
            grade: c.index,
            percentage: c.stats.percentage,
        })
        .collect()
}

pub fn results_table(results: &AnalysisResults) -> String {
    Table::new(cell_rows(results))
        .with(Style::rounded())
        .to_string()
}

pub fn municipality_table(rows: &[MunicipalityRow]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn write_results_csv(results: &AnalysisResults, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    for row in cell_rows(results) {
        writer
            .serialize(row)
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    }
    writer.flush()?;
    Ok(())
}

fn stretch(value: f64, range: (f64, f64)) -> u8 {
    let (lo, hi) = range;
    if hi <= lo {
        return 255;
    }
    (((value - lo) / (hi - lo)).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Paint a raster into an RGBA image
pub fn raster_to_image(raster: &Raster, colormap: Colormap) -> Result<RgbaImage> {
    let (w, h) = (raster.width(), raster.height());
    let mut img = RgbaImage::new(w as u32, h as u32);
    let transparent = Rgba([0, 0, 0, 0]);

    match colormap {
        Colormap::Deforestation => {
            let band = raster.require_band(BAND_DEFORESTATION)?;
            let range = raster.value_range(BAND_DEFORESTATION).unwrap_or((0.0, 1.0));
            for (i, &v) in band.iter().enumerate() {
                let px = if v.is_nan() || v == 0.0 {
                    transparent
                } else {
                    let t = stretch(v, range);
                    Rgba([255, 220 - (t as u16 * 220 / 255) as u8, 0, 255])
                };
                img.put_pixel((i % w) as u32, (i / w) as u32, px);
            }
        }
        Colormap::Vegetation => {
            let band = raster.require_band(BAND_VEGETATION)?;
            for (i, &v) in band.iter().enumerate() {
                let px = if v == 1.0 {
                    Rgba([0, 160, 0, 200])
                } else {
                    transparent
                };
                img.put_pixel((i % w) as u32, (i / w) as u32, px);
            }
        }
        Colormap::FalseColor => {
            let bands = [
                raster.require_band(BAND_NIR)?,
                raster.require_band(BAND_RED)?,
                raster.require_band(BAND_GREEN)?,
            ];
            let ranges = [BAND_NIR, BAND_RED, BAND_GREEN]
                .map(|name| raster.value_range(name).unwrap_or((0.0, 1.0)));
            for i in 0..w * h {
                let values = [bands[0][i], bands[1][i], bands[2][i]];
                let px = if values.iter().any(|v| v.is_nan()) {
                    transparent
                } else {
                    Rgba([
                        stretch(values[0], ranges[0]),
                        stretch(values[1], ranges[1]),
                        stretch(values[2], ranges[2]),
                        255,
                    ])
                };
                img.put_pixel((i % w) as u32, (i / w) as u32, px);
            }
        }
    }
    Ok(img)
}

pub fn write_png(raster: &Raster, colormap: Colormap, path: &Path) -> Result<()> {
    raster_to_image(raster, colormap)?
        .save(path)
        .map_err(|e| Error::Io(std::io::Error::other(format!("{:?}: {}", path, e))))
}

/// A layer of a Leaflet page
#[derive(Debug, Clone)]
pub enum MapLayer {
    Image {
        name: String,
        file: String,
        bounds: BoundingBox,
        opacity: f64,
    },
    Features {
        name: String,
        collection: FeatureCollection,
    },
}

fn polygon_feature(polygon: &Polygon<f64>, properties: Map<String, serde_json::Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(polygon))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Self-contained Leaflet page; `center` is (lat, lon)
pub fn leaflet_page(title: &str, center: (f64, f64), zoom: u8, layers: &[MapLayer]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    html.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet@{v}/dist/leaflet.css\">\n\
         <script src=\"https://unpkg.com/leaflet@{v}/dist/leaflet.js\"></script>\n",
        v = LEAFLET_VERSION
    ));
    html.push_str("<style>html, body, #map { height: 100%; margin: 0; }</style>\n");
    html.push_str("</head>\n<body>\n<div id=\"map\"></div>\n<script>\n");
    html.push_str(&format!(
        "var map = L.map('map').setView([{}, {}], {});\n",
        center.0, center.1, zoom
    ));
    html.push_str(
        "var base = L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', \
         {maxZoom: 19, attribution: '&copy; OpenStreetMap contributors'}).addTo(map);\n",
    );
    html.push_str("var overlays = {};\n");

    for layer in layers {
        match layer {
            MapLayer::Image {
                name,
                file,
                bounds,
                opacity,
            } => {
                let b = bounds.to_leaflet_bounds();
                html.push_str(&format!(
                    "overlays[{}] = L.imageOverlay({}, [[{}, {}], [{}, {}]], {{opacity: {}}}).addTo(map);\n",
                    json!(name),
                    json!(file),
                    b[0][0],
                    b[0][1],
                    b[1][0],
                    b[1][1],
                    opacity
                ));
            }
            MapLayer::Features { name, collection } => {
                let data = serde_json::to_string(collection).unwrap_or_else(|_| "null".into());
                html.push_str(&format!(
                    "overlays[{}] = L.geoJSON({}, {{\n\
                     \x20 style: function (f) {{ return {{color: f.properties.color || '#3388ff', weight: 1, fillOpacity: f.properties.fillOpacity || 0.2}}; }},\n\
                     \x20 onEachFeature: function (f, l) {{ if (f.properties.label) {{ l.bindPopup(f.properties.label); }} }}\n\
                     }}).addTo(map);\n",
                    json!(name),
                    data
                ));
            }
        }
    }

    html.push_str("L.control.layers({'OpenStreetMap': base}, overlays).addTo(map);\n");
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

fn write_page(dir: &Path, file: &str, html: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file);
    fs::write(&path, html)?;
    info!(path = %path.display(), "Map written");
    Ok(path)
}

fn boundary_layer(polygon: &Polygon<f64>) -> MapLayer {
    let mut props = Map::new();
    props.insert("color".into(), json!("#3388ff"));
    props.insert("fillOpacity".into(), json!(0.1));
    MapLayer::Features {
        name: "Polígono".to_string(),
        collection: collection(vec![polygon_feature(polygon, props)]),
    }
}

fn center_of(polygon: &Polygon<f64>) -> (f64, f64) {
    BoundingBox::from_polygon(polygon)
        .map(|b| {
            let (lon, lat) = b.center();
            (lat, lon)
        })
        .unwrap_or((0.0, 0.0))
}

/// Map of the uploaded polygon
pub fn write_polygon_map(polygon: &Polygon<f64>, dir: &Path) -> Result<PathBuf> {
    let html = leaflet_page(
        "Polígono",
        center_of(polygon),
        13,
        &[boundary_layer(polygon)],
    );
    write_page(dir, "polygon.html", &html)
}

/// Files produced for a processing run
#[derive(Debug, Clone)]
pub struct ResultFiles {
    pub map: PathBuf,
    pub csv: PathBuf,
}

/// Results map (composite, vegetation mask, coloured cells) and CSV table
pub fn write_results(
    results: &AnalysisResults,
    polygon: &Polygon<f64>,
    dir: &Path,
) -> Result<ResultFiles> {
    fs::create_dir_all(dir)?;
    let mut layers = Vec::new();

    let frame_raster = results.frame.raster();
    if results.frame.has_rgb() {
        write_png(frame_raster, Colormap::FalseColor, &dir.join("composite.png"))?;
        layers.push(MapLayer::Image {
            name: "Composição (NIR, R, G)".to_string(),
            file: "composite.png".to_string(),
            bounds: frame_raster.bbox(),
            opacity: 1.0,
        });
    }

    let mask_raster = results.mask.raster();
    write_png(mask_raster, Colormap::Vegetation, &dir.join("vegetation.png"))?;
    layers.push(MapLayer::Image {
        name: format!("Vegetação ({:.2}%)", results.overall.percentage),
        file: "vegetation.png".to_string(),
        bounds: mask_raster.bbox(),
        opacity: 0.7,
    });

    let cells = results
        .cells
        .iter()
        .map(|c| {
            let mut props = Map::new();
            props.insert("grade".into(), json!(c.index));
            props.insert("percentage".into(), json!(c.stats.percentage));
            props.insert("color".into(), json!(c.color()));
            props.insert("fillOpacity".into(), json!(0.4));
            props.insert(
                "label".into(),
                json!(format!("Grade {}: {:.2}%", c.index, c.stats.percentage)),
            );
            polygon_feature(&c.cell.to_polygon(), props)
        })
        .collect();
    layers.push(MapLayer::Features {
        name: "Grades".to_string(),
        collection: collection(cells),
    });
    layers.push(boundary_layer(polygon));

    let html = leaflet_page("Resultados NDVI", center_of(polygon), 13, &layers);
    let map = write_page(dir, "results.html", &html)?;

    let csv = dir.join("results.csv");
    write_results_csv(results, &csv)?;
    Ok(ResultFiles { map, csv })
}

/// Deforestation raster over the base map
pub fn write_deforestation_map(overlay: &RasterOverlay, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    write_png(
        &overlay.raster,
        Colormap::Deforestation,
        &dir.join("deforestation.png"),
    )?;
    let layers = [MapLayer::Image {
        name: "Desmatamento".to_string(),
        file: "deforestation.png".to_string(),
        bounds: overlay.bounds,
        opacity: overlay.opacity,
    }];
    let html = leaflet_page("Dashboard de Desmatamento", overlay.center, overlay.zoom, &layers);
    write_page(dir, "deforestation.html", &html)
}
