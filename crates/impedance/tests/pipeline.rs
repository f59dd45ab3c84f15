//! End-to-end runs of the impedance pipeline

use approx::assert_relative_eq;
use habiscape_core::io::{read_geotiff, write_geotiff, Compression, GeoTiffOptions, PixelType};
use habiscape_core::{GeoTransform, Raster, CRS};
use habiscape_impedance::prelude::*;

const CONFIG: &str = r#"
transport:
  roads:
    decline_type: exp_decline
    exp_decline:
      lambda_decay: 2
    prop_decline:
      k_value: 10
  rail:
    decline_type: prop_decline
    exp_decline:
      lambda_decay: 2
    prop_decline:
      k_value: 10
"#;

fn georef(mut r: Raster<f64>) -> Raster<f64> {
    r.set_transform(GeoTransform::new(400_000.0, 300_004.0, 1.0, -1.0));
    r.set_crs(Some(CRS::british_national_grid()));
    r.set_nodata(Some(-9999.0));
    r
}

fn baseline(value: f64) -> Raster<f64> {
    georef(Raster::filled(4, 4, value))
}

fn corner_stressor() -> Raster<f64> {
    let mut r = georef(Raster::filled(4, 4, 0.0));
    r.set(0, 0, 1.0).unwrap();
    r
}

fn config() -> ConfigNode {
    ConfigNode::from_yaml_str(CONFIG).unwrap()
}

fn run(
    baseline: &Raster<f64>,
    baseline_max: Option<f64>,
    stressors: &[Stressor],
    source: MemorySource,
    mode: ProcessingMode,
) -> ImpedanceRun {
    let c = config();
    ImpedancePipeline::new(&c)
        .with_source(source)
        .with_mode(mode)
        .run(baseline, baseline_max, stressors)
        .unwrap()
}

#[test]
fn exponential_at_ceiling_leaves_baseline() {
    let source = MemorySource::new().with("roads.tif", corner_stressor());
    let out = run(
        &baseline(50.0),
        None,
        &[Stressor::new("roads", "roads.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert_eq!(out.baseline_max, 50.0);
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
    assert_eq!(out.impedance.get(3, 3).unwrap(), 50.0);
    assert_eq!(out.applied_count(), 1);
}

#[test]
fn exponential_cap_binds_on_low_baseline() {
    let source = MemorySource::new().with("roads.tif", corner_stressor());
    let out = run(
        &baseline(10.0),
        Some(10.0),
        &[Stressor::new("roads", "roads.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert_eq!(out.impedance.get(0, 0).unwrap(), 10.0);
    assert_eq!(out.impedance.get(3, 3).unwrap(), 10.0);
}

#[test]
fn edge_effect_raises_impedance_near_stressor() {
    let source = MemorySource::new().with("roads.tif", corner_stressor());
    let out = run(
        &baseline(10.0),
        Some(50.0),
        &[Stressor::new("roads", "roads.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
    assert_relative_eq!(out.impedance.get(0, 1).unwrap(), 50.0 * (-0.5f64).exp(), epsilon = 1e-9);
    // 50 * exp(-sqrt(18) / 2) is about 6.0, below the baseline
    assert_eq!(out.impedance.get(3, 3).unwrap(), 10.0);
}

#[test]
fn proportional_decay() {
    let source = MemorySource::new().with("rail.tif", corner_stressor());
    let out = run(
        &baseline(1.0),
        Some(50.0),
        &[Stressor::new("rail", "rail.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert_relative_eq!(out.impedance.get(3, 3).unwrap(), 50.0 - 10.0 * 18f64.sqrt(), epsilon = 1e-9);
    assert_relative_eq!(out.impedance.get(3, 3).unwrap(), 7.57, epsilon = 0.01);
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
}

#[test]
fn unreadable_stressor_is_skipped() {
    let source = MemorySource::new().with("roads.tif", corner_stressor());
    let out = run(
        &baseline(10.0),
        Some(50.0),
        &[
            Stressor::new("rail", "missing.tif"),
            Stressor::new("roads", "roads.tif"),
        ],
        source,
        ProcessingMode::Sequential,
    );

    assert_eq!(out.reports.len(), 2);
    assert!(matches!(out.reports[0].outcome, StressorOutcome::Skipped { .. }));
    assert!(out.reports[1].is_applied());
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
}

#[test]
fn missing_baseline_is_fatal() {
    let c = config();
    let result = ImpedancePipeline::new(&c)
        .with_source(MemorySource::new())
        .run_from_path("baseline.tif", None, &[]);
    assert!(result.is_err());
}

#[test]
fn no_stressors_returns_capped_baseline() {
    let mut base = baseline(10.0);
    base.set(2, 2, 80.0).unwrap();
    base.set(1, 1, -9999.0).unwrap();
    let out = run(&base, Some(40.0), &[], MemorySource::new(), ProcessingMode::Sequential);

    assert_eq!(out.impedance.get(2, 2).unwrap(), 40.0);
    assert_eq!(out.impedance.get(1, 1).unwrap(), -9999.0);
    assert_eq!(out.impedance.get(0, 0).unwrap(), 10.0);
}

#[test]
fn parallel_matches_sequential() {
    let mut far = georef(Raster::filled(4, 4, 0.0));
    far.set(3, 2, 1.0).unwrap();
    let source = MemorySource::new()
        .with("roads.tif", corner_stressor())
        .with("rail.tif", far);
    let stressors = [
        Stressor::new("roads", "roads.tif"),
        Stressor::new("rail", "rail.tif"),
        Stressor::new("tram", "tram.tif"),
    ];

    let seq = run(&baseline(5.0), Some(50.0), &stressors, source.clone(), ProcessingMode::Sequential);
    let par = run(&baseline(5.0), Some(50.0), &stressors, source.clone(), ProcessingMode::Parallel);
    let pool = run(&baseline(5.0), Some(50.0), &stressors, source, ProcessingMode::ParallelWith(2));

    assert_eq!(seq.impedance.data(), par.impedance.data());
    assert_eq!(seq.impedance.data(), pool.impedance.data());
    assert_eq!(seq.reports, par.reports);
    assert_eq!(seq.reports, pool.reports);
}

#[test]
fn stressor_order_does_not_matter() {
    let mut far = georef(Raster::filled(4, 4, 0.0));
    far.set(2, 3, 1.0).unwrap();
    let source = MemorySource::new()
        .with("roads.tif", corner_stressor())
        .with("rail.tif", far);
    let forward = [Stressor::new("roads", "roads.tif"), Stressor::new("rail", "rail.tif")];
    let backward = [Stressor::new("rail", "rail.tif"), Stressor::new("roads", "roads.tif")];

    let a = run(&baseline(5.0), Some(50.0), &forward, source.clone(), ProcessingMode::Sequential);
    let b = run(&baseline(5.0), Some(50.0), &backward, source, ProcessingMode::Sequential);
    assert_eq!(a.impedance.data(), b.impedance.data());
}

#[test]
fn stressor_on_larger_grid_is_realigned() {
    // one extra column and row on each side of the baseline
    let mut big = Raster::filled(6, 6, 0.0);
    big.set_transform(GeoTransform::new(399_999.0, 300_005.0, 1.0, -1.0));
    big.set_nodata(Some(-9999.0));
    big.set(1, 1, 1.0).unwrap();
    let source = MemorySource::new().with("roads.tif", big);

    let out = run(
        &baseline(1.0),
        Some(50.0),
        &[Stressor::new("roads", "roads.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert_eq!(out.impedance.shape(), (4, 4));
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
    assert!(matches!(
        out.reports[0].outcome,
        StressorOutcome::Applied { realigned: true, .. }
    ));
}

#[test]
fn geotiff_run_with_intermediates() {
    let dir = tempfile::tempdir().unwrap();
    let float = GeoTiffOptions::new(PixelType::Float32, Compression::Lzw);
    let baseline_path = dir.path().join("baseline.tif");
    let roads_path = dir.path().join("roads.tif");
    write_geotiff(&baseline(10.0), &baseline_path, Some(float)).unwrap();
    write_geotiff(&corner_stressor(), &roads_path, Some(float)).unwrap();

    let c = config();
    let intermediates = IntermediateOutputs::new(dir.path().join("intermediate"));
    let out = ImpedancePipeline::new(&c)
        .with_intermediates(intermediates.clone())
        .run_from_path(&baseline_path, Some(50.0), &[Stressor::new("roads", roads_path.clone())])
        .unwrap();

    assert!(intermediates.proximity_path("roads").exists());
    assert!(intermediates.edge_path("roads").exists());

    let output_path = dir.path().join("impedance.tif");
    write_geotiff(&out.impedance, &output_path, None).unwrap();
    let written: Raster<f64> = read_geotiff(&output_path, None).unwrap();

    assert_eq!(written.shape(), (4, 4));
    assert_eq!(written.nodata(), Some(-9999.0));
    assert_eq!(written.get(0, 0).unwrap(), 50.0);
    // 50 * exp(-0.5) = 30.33, rounded on Int32 output
    assert_eq!(written.get(0, 1).unwrap(), 30.0);
    assert_eq!(written.get(3, 3).unwrap(), 10.0);
    assert_eq!(written.crs().and_then(|c| c.epsg()), Some(27700));
}

#[test]
fn zero_nodata_stressor_raises_its_own_cells() {
    // railways are rasterised with nodata 0
    let mut rail = corner_stressor();
    rail.set_nodata(Some(0.0));
    let source = MemorySource::new().with("railways.tif", rail);

    let out = run(
        &baseline(10.0),
        Some(50.0),
        &[Stressor::new("roads", "railways.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert!(matches!(
        out.reports[0].outcome,
        StressorOutcome::Applied { proximity_nodata: 0, .. }
    ));
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
    assert_relative_eq!(out.impedance.get(0, 1).unwrap(), 50.0 * (-0.5f64).exp(), epsilon = 1e-9);
}

#[test]
fn zero_nodata_stressor_intermediates_keep_zero_distance() {
    let dir = tempfile::tempdir().unwrap();
    let float = GeoTiffOptions::new(PixelType::Float32, Compression::Lzw);
    let rail_path = dir.path().join("railways.tif");
    let mut rail = corner_stressor();
    rail.set_nodata(Some(0.0));
    write_geotiff(&rail, &rail_path, Some(float)).unwrap();

    let c = config();
    let intermediates = IntermediateOutputs::new(dir.path().join("intermediate")).with_options(float);
    let out = ImpedancePipeline::new(&c)
        .with_intermediates(intermediates.clone())
        .run(&baseline(10.0), Some(50.0), &[Stressor::new("rail", rail_path)])
        .unwrap();
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);

    let dist: Raster<f64> = read_geotiff(intermediates.proximity_path("rail"), None).unwrap();
    assert_eq!(dist.nodata(), Some(-9999.0));
    assert_eq!(dist.get(0, 0).unwrap(), 0.0);
    assert!(!dist.is_nodata(dist.get(0, 0).unwrap()));
    assert_relative_eq!(dist.get(0, 3).unwrap(), 3.0);
}

#[test]
fn non_positive_lambda_skips_only_that_stressor() {
    let c = ConfigNode::from_yaml_str(
        "roads:\n  decline_type: exp_decline\n  exp_decline: {lambda_decay: 2}\n\
         quarries:\n  decline_type: exp_decline\n  exp_decline: {lambda_decay: 0}\n\
         pylons:\n  decline_type: prop_decline\n  prop_decline: {k_value: -5}\n",
    )
    .unwrap();
    let source = MemorySource::new()
        .with("roads.tif", corner_stressor())
        .with("quarries.tif", corner_stressor())
        .with("pylons.tif", corner_stressor());

    let out = ImpedancePipeline::new(&c)
        .with_source(source)
        .with_mode(ProcessingMode::Parallel)
        .run(
            &baseline(10.0),
            Some(50.0),
            &[
                Stressor::new("quarries", "quarries.tif"),
                Stressor::new("roads", "roads.tif"),
                Stressor::new("pylons", "pylons.tif"),
            ],
        )
        .unwrap();

    let skipped: Vec<_> = out.skipped().map(|r| r.name.as_str()).collect();
    assert_eq!(skipped, vec!["quarries", "pylons"]);
    assert!(out.reports[1].is_applied());
    assert_eq!(out.impedance.get(0, 0).unwrap(), 50.0);
    assert_relative_eq!(out.impedance.get(0, 1).unwrap(), 50.0 * (-0.5f64).exp(), epsilon = 1e-9);
}

#[test]
fn empty_stressor_is_applied_without_effect() {
    let source = MemorySource::new().with("roads.tif", georef(Raster::filled(4, 4, 0.0)));
    let base = baseline(10.0);
    let out = run(
        &base,
        Some(50.0),
        &[Stressor::new("roads", "roads.tif")],
        source,
        ProcessingMode::Sequential,
    );

    assert_eq!(
        out.reports[0].outcome,
        StressorOutcome::Applied {
            proximity_nodata: 16,
            realigned: false
        }
    );
    assert_eq!(out.impedance.data(), base.data());
}
