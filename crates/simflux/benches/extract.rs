mod common;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use simflux::prelude::{SurfaceConfig, SurfaceExtractor};

fn extraction_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface/extract");
    let extractor = SurfaceExtractor::new(SurfaceConfig::default());

    for &n in &[16usize, 32, 64] {
        let ds = common::fake_dataset(n, 4, 0xDEADBEEF);
        let ad = ds.all_data();
        ad.get("density").expect("field evaluates");
        group.throughput(common::elements_throughput(n * n * n));

        group.bench_with_input(BenchmarkId::new("density", n), &n, |b, _| {
            b.iter(|| black_box(extractor.extract(&ad, "density", 0.5).expect("surface")));
        });
        group.bench_with_input(BenchmarkId::new("radius", n), &n, |b, _| {
            b.iter(|| black_box(extractor.extract(&ad, "radius", 0.3).expect("surface")));
        });
    }

    group.finish();
}

fn flux_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface/flux");
    let ds = common::fake_dataset(32, 4, 0xBADC0DE);
    let ad = ds.all_data();
    let surf = ds.surface(&ad, "radius", 0.3).expect("surface");
    group.throughput(common::elements_throughput(surf.triangle_count()));

    group.bench_function("velocity_through_sphere", |b| {
        b.iter(|| {
            black_box(
                surf.calculate_flux(
                    "x-velocity",
                    "y-velocity",
                    "z-velocity",
                    Some("density".into()),
                )
                .expect("flux"),
            )
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = extraction_benches, flux_benches
}
criterion_main!(benches);
