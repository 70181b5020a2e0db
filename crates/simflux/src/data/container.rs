//! Data containers: geometric selections that evaluate and cache fields.
use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::{Dataset, FieldArray, Patch, Selector};
use crate::error::{Error, Result};
use crate::fields::context::{
    evaluate_on_patch, particle_positions, resolve_key, PARTICLE_POSITION_FIELDS,
};
use crate::fields::{CacheScope, FieldCache, FieldKey};
use crate::units::Quantity;

/// Identifier of a container, unique within its dataset.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub usize);

/// Value of a container field parameter.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Scalar(f64),
    Vector(DVec3),
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ParamValue::Scalar(v) => Some(*v),
            ParamValue::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<DVec3> {
        match self {
            ParamValue::Vector(v) => Some(*v),
            ParamValue::Scalar(_) => None,
        }
    }
}

/// A selection over a dataset that evaluates fields lazily and caches the results.
///
/// Every container carries a `center` parameter, defaulting to the selection's natural
/// center or the domain center.
#[derive(Debug)]
pub struct DataContainer<'ds> {
    id: ContainerId,
    dataset: &'ds Dataset,
    selector: Selector,
    parameters: HashMap<String, ParamValue>,
    cache: FieldCache,
}

impl<'ds> DataContainer<'ds> {
    pub fn new(dataset: &'ds Dataset, selector: Selector) -> Self {
        let center = selector.center().unwrap_or_else(|| dataset.domain_center());
        let mut parameters = HashMap::new();
        parameters.insert("center".to_string(), ParamValue::Vector(center));
        Self {
            id: dataset.next_container_id(),
            dataset,
            selector,
            parameters,
            cache: FieldCache::new(),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn dataset(&self) -> &'ds Dataset {
        self.dataset
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }

    /// Sets a field parameter. Cached values are dropped since derived fields may read it.
    pub fn set_field_parameter(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        debug!("Container {} parameter '{}' = {:?}.", self.id.0, name, value);
        self.parameters.insert(name, value);
        self.cache.clear();
    }

    pub fn field_parameter(&self, name: &str) -> Option<ParamValue> {
        self.parameters.get(name).copied()
    }

    /// The `center` parameter in code length.
    pub fn center(&self) -> DVec3 {
        self.field_parameter("center")
            .and_then(|p| p.as_vector())
            .unwrap_or_else(|| self.dataset.domain_center())
    }

    /// Patches that may contain selected cells, in dataset order.
    pub fn patches(&self) -> Vec<&'ds Patch> {
        self.dataset
            .patches()
            .iter()
            .filter(|p| self.selector.intersects_patch(p))
            .collect()
    }

    /// Per-cell selection flags for `patch`.
    pub fn cell_mask(&self, patch: &Patch) -> Vec<bool> {
        if self.selector == Selector::All {
            return vec![true; patch.cell_count()];
        }
        patch
            .cell_centers()
            .into_iter()
            .map(|c| self.selector.select_point(c))
            .collect()
    }

    /// Per-particle selection flags for particles of `ptype` owned by `patch`.
    pub fn particle_mask(&self, patch: &Patch, ptype: &str) -> Result<Vec<bool>> {
        let code_length = self.dataset.code_length();
        let mut axes = Vec::with_capacity(3);
        for axis in PARTICLE_POSITION_FIELDS {
            axes.push(
                self.patch_field(patch, &FieldKey::particle(ptype, axis))?
                    .to(&code_length)?,
            );
        }
        Ok(particle_positions(ptype, &axes)?
            .into_iter()
            .map(|p| self.selector.select_point(p))
            .collect())
    }

    /// Canonical key for a request, applying the default particle type.
    pub fn resolve(&self, key: impl Into<FieldKey>) -> FieldKey {
        resolve_key(self.dataset, key.into(), None)
    }

    /// Evaluates `key` on every cell (or particle) of `patch`, ignoring the selection.
    pub fn patch_field(&self, patch: &Patch, key: &FieldKey) -> Result<Arc<FieldArray>> {
        let key = self.resolve(key);
        let mut stack = Vec::new();
        evaluate_on_patch(self, patch, &key, &mut stack)
    }

    /// Evaluates `key` over the selection, concatenating patches in dataset order.
    pub fn get(&self, key: impl Into<FieldKey>) -> Result<Arc<FieldArray>> {
        let key = self.resolve(key);
        if let Some(hit) = self.cache.get(CacheScope::Selection, &key) {
            return Ok(hit);
        }
        let info = self.dataset.field_info(&key)?;
        let units = self
            .dataset
            .parse_unit(&info.units)
            .map_err(|e| Error::evaluation(key.to_string(), e))?;

        let mut parts = Vec::new();
        for patch in self.patches() {
            let values = self.patch_field(patch, &key)?;
            let mask = match (&key.ptype, info.particle_type) {
                (Some(ptype), true) if self.selector != Selector::All => {
                    self.particle_mask(patch, ptype)?
                }
                (_, true) => vec![true; values.len()],
                (_, false) => self.cell_mask(patch),
            };
            parts.push(values.select(&mask));
        }
        let array = FieldArray::concat(&parts, &units)?;
        Ok(self.cache.insert(CacheScope::Selection, key, array))
    }

    /// Minimum and maximum of `key` over the selection, ignoring non-finite values.
    pub fn extrema(&self, key: impl Into<FieldKey>) -> Result<Option<(f64, f64)>> {
        Ok(self.get(key)?.extrema())
    }

    /// Largest value of `key` over the selection.
    pub fn max(&self, key: impl Into<FieldKey>) -> Result<Quantity> {
        let key = key.into();
        let array = self.get(key.clone())?;
        let (_, hi) = array
            .extrema()
            .ok_or_else(|| Error::InvalidData(format!("no finite values of '{key}' selected")))?;
        Ok(Quantity::new(hi, array.units.clone()))
    }

    /// Smallest value of `key` over the selection.
    pub fn min(&self, key: impl Into<FieldKey>) -> Result<Quantity> {
        let key = key.into();
        let array = self.get(key.clone())?;
        let (lo, _) = array
            .extrema()
            .ok_or_else(|| Error::InvalidData(format!("no finite values of '{key}' selected")))?;
        Ok(Quantity::new(lo, array.units.clone()))
    }

    /// Center of the selected cell holding the largest value of mesh field `key`.
    pub fn argmax(&self, key: impl Into<FieldKey>) -> Result<DVec3> {
        let key = self.resolve(key);
        if self.dataset.field_info(&key)?.particle_type {
            return Err(Error::InvalidData(format!(
                "argmax of particle field '{key}' is not supported"
            )));
        }
        let values = self.get(key.clone())?;
        let best = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
                Some((_, b)) if b >= *v => acc,
                _ => Some((i, *v)),
            })
            .map(|(i, _)| i)
            .ok_or_else(|| Error::InvalidData(format!("no finite values of '{key}' selected")))?;
        let x = self.get("x")?;
        let y = self.get("y")?;
        let z = self.get("z")?;
        Ok(DVec3::new(x.values[best], y.values[best], z.values[best]))
    }

    /// Fields read while evaluating `key` in this container.
    pub fn dependencies(&self, key: &FieldKey) -> Vec<FieldKey> {
        self.cache.dependencies(&self.resolve(key))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetBuilder, FakeDatasetBuilder, InMemorySource, PatchId};
    use crate::frontends::art::art_fields;

    fn dataset() -> Dataset {
        FakeDatasetBuilder::new(8)
            .with_patches(4)
            .with_particles(64)
            .build()
            .unwrap()
    }

    #[test]
    fn all_data_selects_every_cell() {
        let ds = dataset();
        let ad = ds.all_data();
        assert_eq!(ad.get("density").unwrap().len(), 512);
        assert_eq!(ad.patches().len(), 4);
        assert_eq!(ad.center(), DVec3::splat(0.5));
    }

    #[test]
    fn sphere_selects_cells_by_center() {
        let ds = dataset();
        let sp = ds.sphere([0.5, 0.5, 0.5], 0.2);
        let r = sp.get("radius").unwrap();
        assert!(!r.is_empty());
        assert!(r.values.iter().all(|v| *v <= 0.2 + 1e-12));
        assert_eq!(sp.center(), DVec3::splat(0.5));
    }

    #[test]
    fn region_selection_counts_cells() {
        let ds = dataset();
        let reg = ds.region([0.0, 0.0, 0.0], [0.5, 0.5, 0.5]);
        assert_eq!(reg.get("ones").unwrap().len(), 64);
        assert_eq!(reg.center(), DVec3::splat(0.25));
    }

    #[test]
    fn repeated_gets_hit_the_cache() {
        let ds = dataset();
        let ad = ds.all_data();
        let a = ad.get("cell_mass").unwrap();
        let b = ad.get("cell_mass").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(
            ad.dependencies(&"cell_mass".into()),
            vec![FieldKey::new("cell_volume"), FieldKey::new("density")]
        );
    }

    #[test]
    fn unknown_fields_fail() {
        let ds = dataset();
        assert!(matches!(
            ds.all_data().get("Pressure"),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn particle_fields_default_to_all_type() {
        let ds = dataset();
        let ad = ds.all_data();
        assert_eq!(ad.resolve("particle_mass"), FieldKey::particle("all", "particle_mass"));
        assert_eq!(ad.get("particle_mass").unwrap().len(), 64);

        let sp = ds.sphere([0.5, 0.5, 0.5], 0.3);
        let inside = sp.get(("all", "particle_mass")).unwrap().len();
        assert!(inside < 64);
    }

    #[test]
    fn max_and_argmax_agree() {
        let ds = dataset();
        let ad = ds.all_data();
        let max = ad.max("density").unwrap();
        let at = ad.argmax("density").unwrap();
        let sp = ds.sphere(at, 1e-6);
        let value = sp.get("density").unwrap();
        assert_eq!(value.len(), 1);
        assert_eq!(value.values[0], max.value);
    }

    #[test]
    fn setting_parameters_clears_cache() {
        let ds = dataset();
        let mut ad = ds.all_data();
        let before = ad.max("radius").unwrap().value;
        ad.set_field_parameter("center", ParamValue::Vector(DVec3::ZERO));
        let after = ad.max("radius").unwrap().value;
        assert!(after > before);
    }

    #[test]
    fn ragged_particle_positions_fail_instead_of_panicking() {
        let mut source = InMemorySource::new();
        source
            .insert(PatchId(0), ("stars", "particle_position_x"), vec![0.1, 0.6, 0.9])
            .insert(PatchId(0), ("stars", "particle_position_y"), vec![0.1, 0.6])
            .insert(PatchId(0), ("stars", "particle_position_z"), vec![0.1, 0.6, 0.9])
            .insert(PatchId(0), ("stars", "particle_mass"), vec![1.0, 2.0, 3.0]);
        let ds = DatasetBuilder::new("ragged", [2, 2, 2])
            .with_field_defaults(art_fields())
            .with_conversion_factor("particle_mass", 1.0)
            .build(source)
            .unwrap();

        let sp = ds.sphere([0.5, 0.5, 0.5], 0.3);
        let err = sp.get(("stars", "particle_mass")).unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidData(_)));

        let err = ds.all_data().get("stars_number_deposit").unwrap_err();
        assert!(matches!(err.root_cause(), Error::InvalidData(_)));
    }
}
