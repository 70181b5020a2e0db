mod common;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn derived_field_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("fields/derived");

    for &n in &[16usize, 32, 64] {
        let ds = common::fake_dataset(n, 4, 0xC0FFEE);
        group.throughput(common::elements_throughput(n * n * n));

        for field in ["cell_mass", "velocity_magnitude", "kinetic_energy", "radius"] {
            group.bench_with_input(BenchmarkId::new(field, n), &n, |b, _| {
                b.iter(|| {
                    // Fresh container so nothing is served from the cache.
                    let ad = ds.all_data();
                    black_box(ad.get(field).expect("field evaluates"));
                });
            });
        }
    }

    group.finish();
}

fn cached_field_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("fields/cached");
    let ds = common::fake_dataset(32, 8, 0xFACEFEED);
    let ad = ds.all_data();
    ad.get("kinetic_energy").expect("field evaluates");
    group.throughput(common::elements_throughput(32 * 32 * 32));

    group.bench_function("kinetic_energy", |b| {
        b.iter(|| black_box(ad.get("kinetic_energy").expect("cached")));
    });

    group.bench_function("sphere_selection", |b| {
        b.iter(|| {
            let sp = ds.sphere([0.5, 0.5, 0.5], 0.25);
            black_box(sp.get("density").expect("field evaluates"));
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = derived_field_benches, cached_field_benches
}
criterion_main!(benches);
