//! Lazy, dependency-driven evaluation of fields on a patch.
//!
//! [`evaluate_on_patch`] resolves a field on one [`Patch`]: it checks the container's
//! cache, validates the descriptor, reads raw data or runs the derived function, applies the
//! convert factor and reconciles units. Derived functions pull their inputs through
//! [`FieldContext::get`], which recurses into the same routine. Fields currently being
//! evaluated form the active chain; re-entering one of them is reported as
//! [`Error::CyclicDependency`].
use std::sync::Arc;

use glam::DVec3;
use tracing::trace;

use crate::data::{DataContainer, Dataset, FieldArray, ParamValue, Patch};
use crate::error::{Error, Result};
use crate::fields::{CacheScope, FieldFunction, FieldKey, DEFAULT_PARTICLE_TYPE};
use crate::units::Unit;

/// Reduction used when depositing particle values onto cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositMethod {
    /// Sum of the particle values in each cell.
    Sum,
    /// Number of particles in each cell.
    Count,
}

/// Handle passed to derived field functions.
pub struct FieldContext<'a, 'ds> {
    container: &'a DataContainer<'ds>,
    patch: &'a Patch,
    stack: &'a mut Vec<FieldKey>,
    field: FieldKey,
}

impl<'a, 'ds> FieldContext<'a, 'ds> {
    /// Evaluates `key` on the current patch, recording it as a dependency.
    ///
    /// Unscoped names inherit the particle type of the field being computed when a
    /// particle field of that name exists.
    pub fn get(&mut self, key: impl Into<FieldKey>) -> Result<Arc<FieldArray>> {
        let key = resolve_key(self.dataset(), key.into(), self.field.ptype.as_deref());
        self.container.cache().record_dependency(&self.field, &key);
        evaluate_on_patch(self.container, self.patch, &key, self.stack)
    }

    /// The field being computed.
    pub fn field(&self) -> &FieldKey {
        &self.field
    }

    pub fn ptype(&self) -> Option<&str> {
        self.field.ptype.as_deref()
    }

    pub fn patch(&self) -> &Patch {
        self.patch
    }

    pub fn container(&self) -> &DataContainer<'ds> {
        self.container
    }

    pub fn dataset(&self) -> &'ds Dataset {
        self.container.dataset()
    }

    pub fn cell_count(&self) -> usize {
        self.patch.cell_count()
    }

    /// A container parameter, failing validation when it is not set.
    pub fn parameter(&self, name: &str) -> Result<ParamValue> {
        self.container
            .field_parameter(name)
            .ok_or_else(|| Error::FieldValidation {
                field: self.field.to_string(),
                reason: format!("parameter '{name}' is not set"),
            })
    }

    /// The container center in code length.
    pub fn center(&self) -> DVec3 {
        self.container.center()
    }

    /// Conversion factor registered by the dataset for `name`.
    pub fn convert(&self, name: &str) -> Result<f64> {
        self.dataset().conversion().convert(name)
    }

    /// A dataset property such as `current_time`.
    pub fn property(&self, name: &str) -> Result<f64> {
        self.dataset()
            .property(name)
            .ok_or_else(|| Error::FieldValidation {
                field: self.field.to_string(),
                reason: format!("dataset property '{name}' is unknown"),
            })
    }

    /// Simulation time in seconds.
    pub fn current_time(&self) -> Result<f64> {
        self.property("current_time")
    }

    /// Parses a unit expression against the dataset's unit registry.
    pub fn unit(&self, expr: &str) -> Result<Unit> {
        self.dataset().parse_unit(expr)
    }

    pub fn code_length(&self) -> Unit {
        self.dataset().code_length()
    }

    /// Deposits particles of `ptype` onto the cells of the current patch with
    /// nearest-grid-point assignment.
    ///
    /// With [`DepositMethod::Sum`], `weights` gives one value per particle (unit weight when
    /// `None`). Particles outside the patch are ignored.
    pub fn deposit(
        &mut self,
        ptype: &str,
        weights: Option<&FieldArray>,
        method: DepositMethod,
    ) -> Result<Vec<f64>> {
        let code_length = self.code_length();
        let mut axes = Vec::with_capacity(3);
        for axis in PARTICLE_POSITION_FIELDS {
            axes.push(self.get(FieldKey::particle(ptype, axis))?.to(&code_length)?);
        }
        let positions = particle_positions(ptype, &axes)?;
        let count = positions.len();
        if let Some(w) = weights {
            if w.len() != count {
                return Err(Error::InvalidData(format!(
                    "deposit weights have {} entries for {count} particles",
                    w.len()
                )));
            }
        }

        let mut out = vec![0.0; self.patch.cell_count()];
        for (n, p) in positions.into_iter().enumerate() {
            let Some([i, j, k]) = self.patch.world_to_index(p) else {
                continue;
            };
            let value = match (method, weights) {
                (DepositMethod::Count, _) => 1.0,
                (DepositMethod::Sum, Some(w)) => w.values[n],
                (DepositMethod::Sum, None) => 1.0,
            };
            out[self.patch.index(i, j, k)] += value;
        }
        Ok(out)
    }
}

pub(crate) const PARTICLE_POSITION_FIELDS: [&str; 3] = [
    "particle_position_x",
    "particle_position_y",
    "particle_position_z",
];

/// Zips per-axis particle position columns into points.
pub(crate) fn particle_positions(ptype: &str, axes: &[FieldArray]) -> Result<Vec<DVec3>> {
    let [x, y, z] = axes else {
        return Err(Error::InvalidData(format!(
            "expected 3 position columns for '{ptype}', found {}",
            axes.len()
        )));
    };
    if y.len() != x.len() || z.len() != x.len() {
        return Err(Error::InvalidData(format!(
            "particle positions of '{ptype}' have mismatched lengths {}, {}, {}",
            x.len(),
            y.len(),
            z.len()
        )));
    }
    Ok(x.iter()
        .zip(y.iter())
        .zip(z.iter())
        .map(|((x, y), z)| DVec3::new(*x, *y, *z))
        .collect())
}

/// Applies particle-type defaults to a requested key.
pub(crate) fn resolve_key(dataset: &Dataset, key: FieldKey, inherited: Option<&str>) -> FieldKey {
    if key.is_particle_scoped() {
        return key;
    }
    let is_particle = |k: &FieldKey| {
        dataset
            .fields()
            .find(k)
            .is_some_and(|info| info.particle_type)
    };
    if let Some(ptype) = inherited {
        let scoped = key.with_ptype(ptype);
        if is_particle(&scoped) {
            return scoped;
        }
        return key;
    }
    if is_particle(&key) {
        return key.with_ptype(DEFAULT_PARTICLE_TYPE);
    }
    key
}

/// Evaluates `key` on `patch`, memoizing the result in the container's cache.
pub(crate) fn evaluate_on_patch(
    container: &DataContainer<'_>,
    patch: &Patch,
    key: &FieldKey,
    stack: &mut Vec<FieldKey>,
) -> Result<Arc<FieldArray>> {
    let scope = CacheScope::Patch(patch.id);
    if let Some(hit) = container.cache().get(scope, key) {
        return Ok(hit);
    }
    if stack.contains(key) {
        let mut chain: Vec<String> = stack.iter().map(ToString::to_string).collect();
        chain.push(key.to_string());
        return Err(Error::CyclicDependency { chain });
    }

    let dataset = container.dataset();
    let info = dataset.field_info(key)?;
    for validator in &info.validators {
        validator
            .check(container, key)
            .map_err(|reason| Error::FieldValidation {
                field: key.to_string(),
                reason,
            })?;
    }
    let declared = dataset
        .parse_unit(&info.units)
        .map_err(|e| Error::evaluation(key.to_string(), e))?;

    let array = match &info.function {
        FieldFunction::Null => {
            let values = dataset
                .source()
                .read_field(patch, key)?
                .ok_or_else(|| Error::MissingRawField {
                    field: key.to_string(),
                    patch: patch.id.0,
                })?;
            if !info.particle_type && values.len() != patch.cell_count() {
                return Err(Error::InvalidData(format!(
                    "raw field '{key}' has {} values for {} cells on patch {}",
                    values.len(),
                    patch.cell_count(),
                    patch.id.0
                )));
            }
            FieldArray::new(values, declared)
        }
        FieldFunction::Derived(f) => {
            stack.push(key.clone());
            let result = {
                let mut ctx = FieldContext {
                    container,
                    patch,
                    stack: &mut *stack,
                    field: key.clone(),
                };
                f(&mut ctx)
            };
            stack.pop();
            let computed = result.map_err(|e| Error::evaluation(key.to_string(), e))?;
            reconcile_units(computed, &declared)
                .map_err(|e| Error::evaluation(key.to_string(), e))?
        }
    };

    let array = match &info.convert {
        Some(convert) => {
            let factor = convert(dataset.conversion())
                .map_err(|e| Error::evaluation(key.to_string(), e))?;
            array.scale(factor)
        }
        None => array,
    };
    trace!(
        "Evaluated '{}' on patch {} ({} values).",
        key,
        patch.id.0,
        array.len()
    );
    Ok(container.cache().insert(scope, key.clone(), array))
}

/// Tags dimensionless results with the declared units and converts compatible ones.
fn reconcile_units(array: FieldArray, declared: &Unit) -> Result<FieldArray> {
    if array.units.is_dimensionless() {
        return Ok(array.with_units(declared.clone()));
    }
    if array.units.same_dimensions(declared) {
        return array.to(declared);
    }
    Err(Error::UnitMismatch {
        expected: declared.expr().to_string(),
        found: array.units.expr().to_string(),
    })
}
