//! Benchmarks for trail network construction.
//!
//! Run with: `cargo bench --bench network --features synthetic`
//!
//! Uses synthetic grids so each stage can be measured at increasing scale.

use criterion::{BenchmarkId, Criterion, SamplingMode, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use trailgraph::synthetic::SyntheticScenario;
use trailgraph::{
    NetworkConfig, build_graph, build_network, consolidate, detect_intersections, split_trails,
};

// ============================================================================
// 1. Full Pipeline Scaling
// ============================================================================

fn bench_pipeline_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_scaling");
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_secs(3));

    for grid_size in [5, 10, 20, 40] {
        if grid_size >= 20 {
            group.sample_size(10);
            group.measurement_time(Duration::from_secs(30));
        } else {
            group.sample_size(20);
            group.measurement_time(Duration::from_secs(10));
        }

        let network = SyntheticScenario::grid(grid_size, 42).generate();
        let config = NetworkConfig::default();

        group.bench_with_input(
            BenchmarkId::new("trails", network.trails.len()),
            &network.trails,
            |b, trails| b.iter(|| build_network(black_box(trails), &config)),
        );
    }

    group.finish();
}

// ============================================================================
// 2. Per-Stage Breakdown
// ============================================================================

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stages");
    group.sample_size(20);

    let network = SyntheticScenario::grid(20, 7).generate();
    let config = NetworkConfig::default();
    let intersections = detect_intersections(&network.trails, &config);
    let split = split_trails(&network.trails, &intersections, &config);
    let (graph, _) = build_graph(&split.segments, &config);

    group.bench_function("detect_intersections", |b| {
        b.iter(|| detect_intersections(black_box(&network.trails), &config))
    });
    group.bench_function("split_trails", |b| {
        b.iter(|| split_trails(black_box(&network.trails), &intersections, &config))
    });
    group.bench_function("build_graph", |b| {
        b.iter(|| build_graph(black_box(&split.segments), &config))
    });
    group.bench_function("consolidate", |b| {
        b.iter_batched(
            || graph.clone(),
            |mut g| consolidate(&mut g, &config),
            criterion::BatchSize::LargeInput,
        )
    });

    group.finish();
}

// ============================================================================
// 3. Chain Length Bound
// ============================================================================

fn bench_chain_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_chain_length");
    group.sample_size(20);

    let scenario = SyntheticScenario {
        fragments_per_line: 30,
        ..SyntheticScenario::grid(10, 3)
    };
    let network = scenario.generate();

    for max_chain_length in [2, 5, 15, 50] {
        let config = NetworkConfig {
            max_chain_length,
            ..Default::default()
        };
        let intersections = detect_intersections(&network.trails, &config);
        let split = split_trails(&network.trails, &intersections, &config);
        let (graph, _) = build_graph(&split.segments, &config);

        group.bench_with_input(
            BenchmarkId::from_parameter(max_chain_length),
            &graph,
            |b, graph| {
                b.iter_batched(
                    || graph.clone(),
                    |mut g| consolidate(&mut g, &config),
                    criterion::BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pipeline_scaling,
    bench_stages,
    bench_chain_length
);
criterion_main!(benches);
