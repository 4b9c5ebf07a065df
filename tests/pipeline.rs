use std::{fs, path::Path};

use approx::assert_relative_eq;
use carbontally::{
    pipeline::{run, AttributeFilter, RunConfig, TIGER_COUNTY_EXTRA_FIELDS},
    raster::write_geotiff,
    table::TableManifest,
    GeoTransform, RasterGrid, Stage, TableFormat, UnitConverter, ZonalConfig, ZonalError,
};
use ndarray::array;

/// 4x4 carbon raster with its top-left corner at the origin.
fn write_raster(path: &Path) {
    let values = array![
        [10.0, 65535.0, 20.0, 200.0],
        [30.0, 40.0, 50.0, 60.0],
        [0.0, 0.0, 0.0, 0.0],
        [5.0, 5.0, 5.0, 5.0],
    ];
    let grid = RasterGrid::new(values, GeoTransform::north_up(0.0, 0.0, 1.0, 1.0), Some(65535.0))
        .unwrap()
        .with_epsg(5070);
    write_geotiff(path, &grid, 2).unwrap();
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> serde_json::Value {
    serde_json::json!({ "type": "Polygon", "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]] })
}

fn write_counties(path: &Path) {
    let feature = |geoid: &str, state: &str, name: &str, geometry: serde_json::Value| serde_json::json!({
        "type": "Feature",
        "properties": { "GEOID": geoid, "STATEFP": state, "NAME": name, "ALAND": 1000, "MTFCC": "G4020" },
        "geometry": geometry,
    });
    let collection = serde_json::json!({
        "type": "FeatureCollection",
        "features": [
            feature("26001", "26", "Alcona", square(0.0, -2.0, 2.0, 0.0)),
            feature("27001", "27", "Aitkin", square(2.0, -2.0, 4.0, 0.0)),
            feature("17001", "17", "Adams", square(0.0, -4.0, 4.0, -2.0)),
            feature("55001", "55", "Adams", square(100.0, 100.0, 101.0, 101.0)),
        ],
    });
    fs::write(path, serde_json::to_vec(&collection).unwrap()).unwrap();
}

fn config() -> ZonalConfig {
    ZonalConfig::new(65535.0, 173.0, UnitConverter::co2e_per_acre_to_carbon(900.0).factor()).unwrap()
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_raster(&dir.path().join("carbon.tif"));
        write_counties(&dir.path().join("counties.geojson"));
        Self { dir }
    }

    fn run_config(&self, output: &str) -> RunConfig {
        RunConfig::new(
            self.dir.path().join("carbon.tif"),
            self.dir.path().join("counties.geojson"),
            self.dir.path().join(output),
            config(),
        )
    }
}

#[test]
fn end_to_end_csv_with_filter_and_dropped_fields() {
    let fixture = Fixture::new();
    let run_config = fixture.run_config("out/carbon.csv")
        .with_filter("STATEFP=26,27,55".parse::<AttributeFilter>().unwrap())
        .with_drop_fields(TIGER_COUNTY_EXTRA_FIELDS);

    let summary = run(&run_config).unwrap();
    assert_eq!(summary.zones, 3);
    assert_eq!(summary.imprecise, 0);
    assert_eq!(summary.location.format, TableFormat::Csv);
    let factor = (900.0 / 4046.86) * (12.0 / 44.0);
    assert_relative_eq!(summary.total_converted, (80.0 + 130.0) * factor, max_relative = 1e-9);

    let text = fs::read_to_string(&summary.location.path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "GEOID,STATEFP,NAME,raw_sum,valid_pixel_count,converted_total");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("26001,26,Alcona,80.0,3,"));
    assert!(lines[2].starts_with("27001,27,Aitkin,130.0,3,"));
    assert!(lines[3].starts_with("55001,55,Adams,0.0,0,"));

    let manifest = TableManifest::read(&summary.location.manifest).unwrap();
    assert_eq!(manifest.rows, 3);
    assert!(manifest.verify(&summary.location.path).unwrap());
    assert_eq!(manifest.config.unwrap()["max_valid_threshold"], 173.0);
}

#[test]
fn geojson_output_keeps_geometry() {
    let fixture = Fixture::new();
    let summary = run(&fixture.run_config("carbon.geojson")).unwrap();
    assert_eq!(summary.zones, 4);

    let value: serde_json::Value = serde_json::from_slice(&fs::read(&summary.location.path).unwrap()).unwrap();
    let features = value["features"].as_array().unwrap();
    assert_eq!(features.len(), 4);
    assert_eq!(features[2]["properties"]["GEOID"], "17001");
    assert_eq!(features[2]["properties"]["raw_sum"], 20.0);
    assert_eq!(features[2]["properties"]["valid_pixel_count"], 8);
    assert_eq!(features[2]["geometry"]["type"], "MultiPolygon");
}

#[test]
fn all_touched_policy_flows_through_the_run() {
    let fixture = Fixture::new();
    let counties = fixture.dir.path().join("small.geojson");
    fs::write(&counties, serde_json::to_vec(&serde_json::json!({
        "type": "FeatureCollection",
        "features": [{ "type": "Feature", "properties": { "GEOID": "x" }, "geometry": square(0.6, -1.4, 1.4, -0.6) }],
    })).unwrap()).unwrap();

    let mut center = fixture.run_config("center.csv");
    center.zones = counties.clone();
    assert_eq!(run(&center).unwrap().total_converted, 0.0);

    let mut touched = fixture.run_config("touched.csv");
    touched.zones = counties;
    touched.zonal = touched.zonal.with_policy(carbontally::CoveragePolicy::AllTouched);
    let summary = run(&touched).unwrap();
    let text = fs::read_to_string(&summary.location.path).unwrap();
    assert!(text.lines().nth(1).unwrap().starts_with("x,80.0,3,"));
}

#[test]
fn refuses_to_overwrite_without_force() {
    let fixture = Fixture::new();
    let output = fixture.dir.path().join("carbon.csv");
    fs::write(&output, "previous run").unwrap();

    let err = run(&fixture.run_config("carbon.csv")).unwrap_err();
    assert!(matches!(err.source, ZonalError::OutputExists(_)));
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous run");

    run(&fixture.run_config("carbon.csv").with_overwrite(true)).unwrap();
    assert!(fs::read_to_string(&output).unwrap().starts_with("GEOID"));
}

#[test]
fn fatal_errors_name_the_stage_and_write_nothing() {
    let fixture = Fixture::new();

    let mut bad_zones = fixture.run_config("a.csv");
    bad_zones.zones = fixture.dir.path().join("nowhere.geojson");
    let err = run(&bad_zones).unwrap_err();
    assert_eq!(err.stage, Stage::ZoneLoad);

    let mut bad_raster = fixture.run_config("b.csv");
    bad_raster.raster = fixture.dir.path().join("counties.geojson");
    let err = run(&bad_raster).unwrap_err();
    assert_eq!(err.stage, Stage::RasterLoad);
    assert!(matches!(err.source, ZonalError::UnsupportedFormat(_)));

    let bad_filter = fixture.run_config("c.csv")
        .with_filter("COUNTYFP=001".parse().unwrap());
    assert_eq!(run(&bad_filter).unwrap_err().stage, Stage::ZoneLoad);

    for name in ["a.csv", "b.csv", "c.csv"] {
        assert!(!fixture.dir.path().join(name).exists(), "{name}");
        assert!(!fixture.dir.path().join(format!("{name}.manifest.json")).exists(), "{name}");
    }
}

#[test]
fn rerunning_produces_identical_output() {
    let fixture = Fixture::new();
    let first = run(&fixture.run_config("first.parquet").with_format(TableFormat::Csv)).unwrap();
    let second = run(&fixture.run_config("second.csv").with_overlap_check(true)).unwrap();
    assert_eq!(first.location.sha256, second.location.sha256);
}
