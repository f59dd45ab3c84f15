//! Benchmarks for the impedance pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use habiscape_core::{GeoTransform, Raster};
use habiscape_impedance::prelude::*;

fn create_stressor(size: usize, seed: usize) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(0.0, size as f64 * 25.0, 25.0, -25.0));
    r.set_nodata(Some(-9999.0));
    // sparse linear features, like rasterised roads
    for i in 0..size {
        let col = (i * (seed + 3) / 7 + seed * 11) % size;
        r.set(i, col, 1.0).unwrap();
    }
    r
}

fn create_baseline(size: usize) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(0.0, size as f64 * 25.0, 25.0, -25.0));
    r.set_nodata(Some(-9999.0));
    for row in 0..size {
        for col in 0..size {
            r.set(row, col, 1.0 + ((row * 7 + col * 13) % 100) as f64).unwrap();
        }
    }
    r
}

fn bench_proximity(c: &mut Criterion) {
    let mut group = c.benchmark_group("impedance/proximity");
    for size in [256, 512, 1024, 2048] {
        let stressor = create_stressor(size, 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut r = stressor.clone();
                compute_proximity(black_box(&mut r), "bench").unwrap()
            })
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let config = ConfigNode::from_yaml_str(
        "roads:\n  s0: {decline_type: exp_decline, exp_decline: {lambda_decay: 500}}\n  \
         s1: {decline_type: prop_decline, prop_decline: {k_value: 0.2}}\n  \
         s2: {decline_type: exp_decline, exp_decline: {lambda_decay: 100}}\n  \
         s3: {decline_type: prop_decline, prop_decline: {k_value: 1}}\n",
    )
    .unwrap();

    let mut group = c.benchmark_group("impedance/pipeline");
    group.sample_size(10);
    for size in [256, 1024] {
        let baseline = create_baseline(size);
        let mut source = MemorySource::new();
        let mut stressors = Vec::new();
        for i in 0..4 {
            let name = format!("s{}", i);
            source.insert(format!("{}.tif", name), create_stressor(size, i));
            stressors.push(Stressor::new(name.clone(), format!("{}.tif", name)));
        }

        for mode in [ProcessingMode::Sequential, ProcessingMode::Parallel] {
            let pipeline = ImpedancePipeline::new(&config)
                .with_source(source.clone())
                .with_mode(mode);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), size),
                &size,
                |b, _| b.iter(|| pipeline.run(black_box(&baseline), None, &stressors).unwrap()),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_proximity, bench_pipeline);
criterion_main!(benches);
