use chrono::NaiveDate;
use ndvigrid::collect::imagery::DateRange;
use ndvigrid::collect::synthetic::SyntheticImagery;
use ndvigrid::config::AnalysisConfig;
use ndvigrid::dashboard::{Banner, Session, SessionState, COLOR_SPARSE, COLOR_VEGETATED};
use ndvigrid::geo_core::BoundingBox;
use ndvigrid::render::{results_table, write_polygon_map, write_results};

const FIELD: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "properties": {"name": "talhão"},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[-61.0, -11.0], [-60.99, -11.0], [-60.99, -10.99], [-61.0, -10.99], [-61.0, -11.0]]]
        }
    }]
}"#;

fn dates() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
    )
    .unwrap()
}

#[test]
fn test_analysis_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("field.geojson");
    std::fs::write(&path, FIELD).unwrap();

    let mut session = Session::new(SyntheticImagery::split(-60.995), AnalysisConfig::default());
    session.start().unwrap();
    session.upload_file(&path).unwrap();
    assert_eq!(session.state(), SessionState::PolygonLoaded);

    let polygon = session.polygon().unwrap().clone();
    let bbox = BoundingBox::from_polygon(&polygon).unwrap();
    assert!(bbox.min_x <= bbox.max_x && bbox.min_y <= bbox.max_y);
    assert!(write_polygon_map(&polygon, dir.path()).unwrap().exists());

    session.process(dates()).unwrap();
    assert_eq!(session.state(), SessionState::Results);
    assert!(matches!(&session.banners()[0], Banner::Info(m) if m.contains("NDVI")));

    let results = session.results().unwrap();
    assert_eq!(results.cells.len(), 4);
    for cell in &results.cells {
        assert!((0.0..=100.0).contains(&cell.stats.percentage));
        assert!(cell.stats.total_area_sq_m > 0.0);
    }
    let colors: Vec<_> = results.cells.iter().map(|c| c.color()).collect();
    assert_eq!(
        colors,
        vec![COLOR_VEGETATED, COLOR_SPARSE, COLOR_VEGETATED, COLOR_SPARSE]
    );

    let table = results_table(results);
    assert!(table.contains("Grade"));
    assert!(table.contains("Porcentagem de Vegetação (%)"));

    let files = write_results(results, &polygon, dir.path()).unwrap();
    let csv = std::fs::read_to_string(&files.csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Grade,Porcentagem de Vegetação (%)"));
    assert_eq!(lines.count(), 4);

    let html = std::fs::read_to_string(&files.map).unwrap();
    assert!(html.contains(COLOR_VEGETATED));
    assert!(html.contains("vegetation.png"));
    assert!(dir.path().join("composite.png").exists());
}

#[test]
fn test_custom_cell_size() {
    let config = AnalysisConfig {
        cell_width_m: 400.0,
        cell_height_m: 400.0,
        ..AnalysisConfig::default()
    };
    let mut session = Session::new(SyntheticImagery::uniform(0.5, 0.1), config);
    session.start().unwrap();
    session.upload_str(FIELD).unwrap();
    let results = session.process(dates()).unwrap();
    // 0.01° is about 1113 m wide and 1105 m high
    assert_eq!(results.cells.len(), 9);
    assert!(results.cells.iter().all(|c| c.stats.percentage == 100.0));
}
