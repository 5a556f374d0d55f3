use anyhow::Result;
use ndvigrid::collect::ibge::{IbgeCollect, MunicipalitySource};
use ndvigrid::config::{DEFAULT_MUNICIPALITY_CODE, DEFAULT_TIF_URL};
use ndvigrid::geometric::deforestation::{Deforestation, RasterSource};
use ndvigrid::render::{municipality_table, write_deforestation_map};

/// Example: deforestation raster overlay and municipality attributes
fn main() -> Result<()> {
    println!("=== Example: deforestation dashboard ===\n");

    let loader = Deforestation::new(RasterSource::parse(DEFAULT_TIF_URL));
    println!("Downloading raster from {:?}...", loader.source());
    let overlay = loader.overlay()?;
    println!("  - Bounds [[S, W], [N, E]]: {:?}", overlay.bounds.to_leaflet_bounds());
    println!("  - Centre (lat, lon): {:?}", overlay.center);

    let map = write_deforestation_map(&overlay, "./output".as_ref())?;
    println!("  - Map: {:?}", map);

    println!("\nReading municipality {} from IBGE...", DEFAULT_MUNICIPALITY_CODE);
    let ibge = IbgeCollect::new()?;
    let rows = ibge.read_municipality(DEFAULT_MUNICIPALITY_CODE)?;
    println!("{}", municipality_table(&rows));

    println!("\n✅ Done!");
    Ok(())
}
