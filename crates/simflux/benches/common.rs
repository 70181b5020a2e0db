#![allow(dead_code)]
use std::time::Duration;

use criterion::{Criterion, Throughput};
use simflux::prelude::{Dataset, FakeDatasetBuilder};

pub const SAMPLE_SIZE: usize = 20;
pub const WARM_UP: Duration = Duration::from_secs(1);
pub const MEASUREMENT_TIME: Duration = Duration::from_secs(3);

pub fn default_criterion() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .sample_size(SAMPLE_SIZE)
        .warm_up_time(WARM_UP)
        .measurement_time(MEASUREMENT_TIME)
}

pub fn elements_throughput(elements: usize) -> Throughput {
    Throughput::Elements(elements.max(1) as u64)
}

/// A random dataset with `n**3` cells split into `patches` patches.
pub fn fake_dataset(n: usize, patches: usize, seed: u64) -> Dataset {
    FakeDatasetBuilder::new(n)
        .with_patches(patches)
        .with_fields(&[
            ("density", "g/cm**3"),
            ("temperature", "K"),
            ("x-velocity", "cm/s"),
            ("y-velocity", "cm/s"),
            ("z-velocity", "cm/s"),
        ])
        .with_seed(seed)
        .build()
        .expect("fake dataset")
}
