use anyhow::Result;
use chrono::NaiveDate;
use ndvigrid::collect::imagery::DateRange;
use ndvigrid::collect::synthetic::SyntheticImagery;
use ndvigrid::config::AnalysisConfig;
use ndvigrid::dashboard::Session;
use ndvigrid::geometric::grid::generate_grid;
use ndvigrid::render::{results_table, write_results};

/// Example: grid vegetation analysis of a GeoJSON polygon, without network access
fn main() -> Result<()> {
    println!("=== Example: NDVI grid analysis (synthetic imagery) ===\n");

    let geojson = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [-61.95, -11.93], [-61.93, -11.93], [-61.93, -11.91],
                [-61.95, -11.91], [-61.95, -11.93]
            ]]
        }
    }"#;

    let polygon = ndvigrid::geometric::boundary::parse_polygon(geojson)?;
    let cells = generate_grid(&polygon, 800.0, 800.0)?;
    println!("Polygon tiled into {} cells of 800 m x 800 m", cells.len());

    // Dense vegetation west of -61.94, bare soil east of it
    let mut session = Session::new(SyntheticImagery::split(-61.94), AnalysisConfig::default());
    session.start()?;
    session.upload_str(geojson)?;

    let dates = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default(),
        NaiveDate::from_ymd_opt(2024, 8, 31).unwrap_or_default(),
    )?;
    let results = session.process(dates)?;

    println!(
        "\nVegetation over the whole polygon: {:.2}%",
        results.overall.percentage
    );
    println!("{}", results_table(results));

    let files = write_results(results, &polygon, std::path::Path::new("./output"))?;
    println!("\n✅ Done!");
    println!("  - Map: {:?}", files.map);
    println!("  - Table: {:?}", files.csv);

    Ok(())
}
