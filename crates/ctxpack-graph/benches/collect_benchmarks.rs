//! Benchmarks for manifest linking and bounded collection
//!
//! These benchmarks measure how manifest relinking and breadth-first
//! collection scale with project size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ctxpack_core::{Composition, Contract};
use ctxpack_graph::{collect, ProjectManifest};

/// Generate N contracts where each component uses the previous two
fn generate_contracts(num_components: usize) -> Vec<Contract> {
    (0..num_components)
        .map(|i| {
            let components: Vec<String> = (i.saturating_sub(2)..i)
                .map(|j| format!("Widget{}", j))
                .collect();
            let imports: Vec<String> = components
                .iter()
                .map(|name| format!("./{}", name))
                .chain(std::iter::once("react".to_string()))
                .collect();

            Contract::new(
                format!("src/components/Widget{}.tsx", i),
                format!("uif:{:024}", i),
                format!("uif:{:024}", i),
            )
            .with_composition(Composition {
                components,
                functions: Vec::new(),
                imports,
            })
        })
        .collect()
}

/// Benchmark: Build and relink a manifest (100, 500, 1000 components)
fn bench_manifest_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_build");

    for num_components in [100, 500, 1000].iter() {
        let contracts = generate_contracts(*num_components);

        group.bench_with_input(
            BenchmarkId::from_parameter(num_components),
            num_components,
            |b, _| b.iter(|| black_box(ProjectManifest::from_contracts(&contracts))),
        );
    }

    group.finish();
}

/// Generate N contracts spread over 50 directories, each using the next two
/// by bare name and importing two packages
fn generate_spread_contracts(num_components: usize) -> Vec<Contract> {
    (0..num_components)
        .map(|i| {
            let components: Vec<String> = (i + 1..(i + 3).min(num_components))
                .map(|j| format!("Widget{}", j))
                .collect();

            Contract::new(
                format!("src/area{}/Widget{}.tsx", i % 50, i),
                format!("uif:{:024}", i),
                format!("uif:{:024}", i),
            )
            .with_composition(Composition {
                components,
                functions: Vec::new(),
                imports: vec!["react".to_string(), "clsx".to_string()],
            })
        })
        .collect()
}

/// Benchmark: Relink a manifest whose references resolve by name (1000, 3000, 5000 components)
fn bench_relink(c: &mut Criterion) {
    let mut group = c.benchmark_group("relink");

    for num_components in [1000, 3000, 5000].iter() {
        let mut manifest = ProjectManifest::from_contracts(&generate_spread_contracts(*num_components));

        group.bench_with_input(
            BenchmarkId::from_parameter(num_components),
            num_components,
            |b, _| {
                b.iter(|| {
                    manifest.relink();
                    black_box(manifest.roots().len())
                })
            },
        );
    }

    group.finish();
}

/// Benchmark: Collect from the deepest component at increasing depths
fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    let contracts = generate_contracts(500);
    let manifest = ProjectManifest::from_contracts(&contracts);
    let entry = "src/components/Widget499.tsx";

    for depth in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, depth| {
            b.iter(|| black_box(collect(entry, &manifest, *depth, 100)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_manifest_build, bench_relink, bench_collect);
criterion_main!(benches);
