use anyhow::Result;
use chrono::NaiveDate;
use geo::MultiPolygon;
use ndvigrid::collect::imagery::{CompositeRequest, DateRange, ImageryBackend};
use ndvigrid::collect::wms::WmsImagery;
use ndvigrid::config::WmsConfig;
use ndvigrid::geo_core::BoundingBox;
use ndvigrid::geometric::vegetation::compute_stats;
use ndvigrid::render::{write_png, Colormap};

/// Example: NDVI vegetation share of a bounding box from Sentinel-2 through
/// Sentinel Hub WMS. Needs the instance id in `SH_INSTANCE_ID`.
fn main() -> Result<()> {
    println!("=== Example: vegetation from Sentinel Hub WMS (NDVI) ===\n");

    // Alta Floresta D'Oeste, Rondônia
    let bbox = BoundingBox::new(-61.95, -11.93, -61.93, -11.91);
    println!("Bounding box:");
    println!("  - Longitude: {} to {}", bbox.min_x, bbox.max_x);
    println!("  - Latitude: {} to {}", bbox.min_y, bbox.max_y);

    let config = WmsConfig {
        instance_id: std::env::var("SH_INSTANCE_ID").ok(),
        ..WmsConfig::default()
    };
    let backend = WmsImagery::new(config)?;
    let request = CompositeRequest {
        bbox,
        dates: DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
            NaiveDate::from_ymd_opt(2024, 8, 31).unwrap_or_default(),
        )?,
        max_cloud_cover: 20.0,
    };

    println!("\nDownloading composite {}...", request.dates.to_time_param());
    let frame = backend.fetch_composite(&request)?;
    println!(
        "  - {} x {} pixels",
        frame.raster().width(),
        frame.raster().height()
    );

    println!("Computing NDVI = (NIR - Red) / (NIR + Red)...");
    let region = MultiPolygon::new(vec![bbox.to_polygon()]);
    let (mask, stats) = compute_stats(&backend, &frame, &region, 100_000_000)?;

    println!("\n✅ Vegetation: {:.2}%", stats.percentage);
    println!("  - Total area: {:.0} m²", stats.total_area_sq_m);
    println!("  - Vegetated area: {:.0} m²", stats.vegetated_area_sq_m);

    std::fs::create_dir_all("./output")?;
    write_png(mask.raster(), Colormap::Vegetation, "./output/vegetation.png".as_ref())?;
    println!("  - Mask: ./output/vegetation.png");

    Ok(())
}
