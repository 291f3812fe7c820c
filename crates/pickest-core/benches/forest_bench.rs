//! # Forest Benchmarks
//!
//! Performance benchmarks for fitting, scoring and exporting forests.
//!
//! Run with: `cargo bench -p pickest-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pickest_core::{
    Dataset, ForestParams, OnnxExportOptions, OnnxModel, PickingRecord, RandomForest, export_onnx,
};
use std::hint::black_box;

/// Synthetic picking table with `rows` rows.
fn create_dataset(rows: usize) -> Dataset {
    let records: Vec<PickingRecord> = (0..rows)
        .map(|i| {
            let items = (i % 25) as f32 + 1.0;
            let distance = (i % 17) as f32 * 4.0;
            let experience = (i % 10) as f32 + 1.0;
            PickingRecord::new(
                [items, (i % 9) as f32, 0.5, distance, experience, 0.3],
                items * 0.7 + distance * 0.15 - experience * 0.2,
            )
        })
        .collect();
    Dataset::from_records(&records)
}

fn params(n_estimators: usize) -> ForestParams {
    ForestParams {
        n_estimators,
        ..ForestParams::default()
    }
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_fit");
    group.sample_size(10);

    for rows in [100, 1000, 5000].iter() {
        let dataset = create_dataset(*rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &dataset, |b, ds| {
            b.iter(|| black_box(RandomForest::fit(ds, params(20))));
        });
    }

    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_predict");

    let dataset = create_dataset(1000);
    let forest = RandomForest::fit(&dataset, params(100)).expect("fit");
    let x = [10.0, 5.0, 2.0, 3.5, 1.0, 0.8];

    group.bench_function("native", |b| b.iter(|| black_box(forest.predict(&x))));

    let model = OnnxModel::from_bytes(&export_onnx(&forest, &OnnxExportOptions::default()))
        .expect("load");
    group.bench_function("onnx_runtime", |b| b.iter(|| black_box(model.predict(&x))));

    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("onnx_export");

    for trees in [10, 100].iter() {
        let forest = RandomForest::fit(&create_dataset(1000), params(*trees)).expect("fit");
        let options = OnnxExportOptions::default();
        group.bench_with_input(BenchmarkId::from_parameter(trees), &forest, |b, f| {
            b.iter(|| black_box(export_onnx(f, &options)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_predict, bench_export);
criterion_main!(benches);
