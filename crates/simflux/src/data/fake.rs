//! Synthetic datasets filled with seeded random values.
//!
//! [`FakeDatasetBuilder`] produces a dataset over the unit cube with uniform random cell
//! values in `[0, 1)` and optional particles, split into patches. Values are generated over
//! the global lattice before decomposition, so the same seed gives the same field
//! regardless of the patch count.
use std::sync::Arc;

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{decompose_domain, Dataset, DatasetBuilder, InMemorySource};
use crate::error::{Error, Result};
use crate::fields::universal::{register_deposit_fields, universal_fields};
use crate::fields::{FieldInfo, FieldKey, FieldRegistry, DEFAULT_PARTICLE_TYPE};

const PARTICLE_FIELDS: [(&str, &str); 8] = [
    ("particle_position_x", "code_length"),
    ("particle_position_y", "code_length"),
    ("particle_position_z", "code_length"),
    ("particle_velocity_x", "cm/s"),
    ("particle_velocity_y", "cm/s"),
    ("particle_velocity_z", "cm/s"),
    ("particle_mass", "g"),
    ("particle_index", ""),
];

pub(crate) fn rand01(rng: &mut dyn Rng) -> f64 {
    (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}

/// Builder for random test datasets.
#[derive(Clone, Debug)]
pub struct FakeDatasetBuilder {
    dims: [usize; 3],
    patches: usize,
    fields: Vec<(String, String)>,
    particles: usize,
    seed: u64,
    length_unit_cm: f64,
    field_defaults: Option<Arc<FieldRegistry>>,
}

impl FakeDatasetBuilder {
    /// An `n`³ dataset with a single `density` field in `g/cm**3`.
    pub fn new(n: usize) -> Self {
        Self {
            dims: [n; 3],
            patches: 1,
            fields: vec![("density".into(), "g/cm**3".into())],
            particles: 0,
            seed: 0x5eed,
            length_unit_cm: 1.0,
            field_defaults: None,
        }
    }

    pub fn with_dimensions(mut self, dims: [usize; 3]) -> Self {
        self.dims = dims;
        self
    }

    /// Splits the domain into about `count` patches.
    pub fn with_patches(mut self, count: usize) -> Self {
        self.patches = count;
        self
    }

    /// Replaces the mesh fields with `(name, units)` pairs.
    pub fn with_fields(mut self, fields: &[(&str, &str)]) -> Self {
        self.fields = fields
            .iter()
            .map(|(name, units)| (name.to_string(), units.to_string()))
            .collect();
        self
    }

    /// Adds `count` particles of type `all`.
    pub fn with_particles(mut self, count: usize) -> Self {
        self.particles = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Length of one code unit in centimeters.
    pub fn with_length_unit(mut self, length_cm: f64) -> Self {
        self.length_unit_cm = length_cm;
        self
    }

    /// Registry the generated raw fields are layered on. Defaults to the universal fields.
    pub fn with_field_defaults(mut self, defaults: Arc<FieldRegistry>) -> Self {
        self.field_defaults = Some(defaults);
        self
    }

    pub fn build(self) -> Result<Dataset> {
        if self.dims.contains(&0) {
            return Err(Error::InvalidConfig("fake dataset needs cells".into()));
        }
        let patches = decompose_domain(DVec3::ZERO, DVec3::ONE, self.dims, self.patches);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut source = InMemorySource::new();

        let [nx, ny, nz] = self.dims;
        for (name, _) in &self.fields {
            let global: Vec<f64> = (0..nx * ny * nz).map(|_| rand01(&mut rng)).collect();
            for patch in &patches {
                let mut values = Vec::with_capacity(patch.cell_count());
                for k in 0..patch.dims[2] {
                    for j in 0..patch.dims[1] {
                        for i in 0..patch.dims[0] {
                            let gi = patch.start_index[0] + i;
                            let gj = patch.start_index[1] + j;
                            let gk = patch.start_index[2] + k;
                            values.push(global[gi + nx * (gj + ny * gk)]);
                        }
                    }
                }
                source.insert(patch.id, name.as_str(), values);
            }
        }

        if self.particles > 0 {
            let mut per_patch = vec![vec![Vec::new(); PARTICLE_FIELDS.len()]; patches.len()];
            for n in 0..self.particles {
                let p = DVec3::new(rand01(&mut rng), rand01(&mut rng), rand01(&mut rng));
                let v = DVec3::new(
                    rand01(&mut rng) - 0.5,
                    rand01(&mut rng) - 0.5,
                    rand01(&mut rng) - 0.5,
                );
                let mass = rand01(&mut rng);
                let Some(owner) = patches.iter().position(|patch| patch.contains(p)) else {
                    continue;
                };
                let row = [p.x, p.y, p.z, v.x, v.y, v.z, mass, n as f64];
                for (column, value) in per_patch[owner].iter_mut().zip(row) {
                    column.push(value);
                }
            }
            for (patch, columns) in patches.iter().zip(per_patch) {
                for ((name, _), values) in PARTICLE_FIELDS.iter().zip(columns) {
                    source.insert(
                        patch.id,
                        FieldKey::particle(DEFAULT_PARTICLE_TYPE, *name),
                        values,
                    );
                }
            }
        }

        let fallback = self
            .field_defaults
            .unwrap_or_else(|| Arc::new(universal_fields()));
        let mut registry = FieldRegistry::create_with_fallback(fallback);
        for (name, units) in &self.fields {
            registry.add(FieldInfo::raw(name.as_str()).with_units(units.as_str()));
        }
        if self.particles > 0 {
            for (name, units) in PARTICLE_FIELDS {
                registry.add(
                    FieldInfo::raw(name)
                        .with_units(units)
                        .with_take_log(name == "particle_mass")
                        .particle(),
                );
            }
            register_deposit_fields(&mut registry, DEFAULT_PARTICLE_TYPE, "Particle");
        }

        DatasetBuilder::new("fake_random_ds", self.dims)
            .with_patches(patches)
            .with_code_units(self.length_unit_cm, 1.0, 1.0)
            .with_property("current_time", 0.0)
            .with_field_defaults(Arc::new(registry))
            .build(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_independent_of_decomposition() {
        let one = FakeDatasetBuilder::new(8).build().unwrap();
        let four = FakeDatasetBuilder::new(8).with_patches(4).build().unwrap();
        let a = one.all_data().max("density").unwrap().value;
        let b = four.all_data().max("density").unwrap().value;
        assert_eq!(a, b);
        assert_eq!(four.patches().len(), 4);
    }

    #[test]
    fn values_lie_in_unit_interval() {
        let ds = FakeDatasetBuilder::new(6).with_seed(7).build().unwrap();
        let rho = ds.all_data().get("density").unwrap();
        assert!(rho.values.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn particles_are_assigned_to_owning_patches() {
        let ds = FakeDatasetBuilder::new(8)
            .with_patches(8)
            .with_particles(100)
            .build()
            .unwrap();
        let ad = ds.all_data();
        assert_eq!(ad.get("particle_index").unwrap().len(), 100);
        for patch in ds.patches() {
            let x = ad
                .patch_field(patch, &("all", "particle_position_x").into())
                .unwrap();
            let lo = patch.left_edge.x;
            let hi = patch.right_edge().x;
            assert!(x.values.iter().all(|v| *v >= lo && *v < hi));
        }
    }

    #[test]
    fn zero_sized_domains_are_rejected() {
        assert!(FakeDatasetBuilder::new(0).build().is_err());
    }
}
